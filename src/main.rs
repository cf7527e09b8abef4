//! Main entry point for the remotezip CLI application.
//!
//! Lists or extracts files of a remote ZIP archive through HTTP Range
//! requests, falling back to a single download when the server does not
//! support them.

use anyhow::{Context, Result, bail};
use clap::Parser;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use httpreaderat::{
    BufReaderAt, Cli, FileStore, HttpReaderAt, LimitedStore, MemoryStore, OverflowPolicy, Store,
    ZipArchive, ZipEntry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    // process-wide rustls provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let reader = open_remote(&cli).await?;
    let archive = ZipArchive::open(BufReaderAt::with_capacity(cli.buffer_size, reader))
        .await
        .context("zip reader create failed")?;

    if cli.list {
        print_entries(&archive);
    } else if let Some(path) = &cli.file {
        let Some(entry) = archive.by_name(path) else {
            bail!("no such file in archive: {} (use -l to list files)", path);
        };
        archive
            .copy_to(entry, &mut tokio::io::stdout())
            .await
            .with_context(|| format!("extracting {}", path))?;
    }

    if !cli.quiet {
        let http = archive.reader().get_ref();
        eprintln!(
            "Total bytes transferred: {} ({})",
            format_size(http.transferred_bytes()),
            if http.supports_range() { "range requests" } else { "full download" }
        );
    }

    Ok(())
}

/// Build the request from the CLI options and open the remote archive.
async fn open_remote(cli: &Cli) -> Result<HttpReaderAt> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()?;

    let mut request = client
        .get(&cli.url)
        .build()
        .context("http request create failed")?;
    for (name, value) in &cli.headers {
        request.headers_mut().append(
            HeaderName::try_from(name.as_str()).with_context(|| format!("header name {:?}", name))?,
            HeaderValue::try_from(value.as_str()).with_context(|| format!("header value {:?}", value))?,
        );
    }

    let store = (!cli.no_fallback).then(|| backing_store(cli));
    HttpReaderAt::new(client, request, store)
        .await
        .context("httpreaderat open failed")
}

/// Memory up to `--memory-limit`, then a temporary file.
fn backing_store(cli: &Cli) -> Box<dyn Store> {
    let file = match &cli.temp_dir {
        Some(dir) => FileStore::in_dir(dir),
        None => FileStore::new(),
    };
    Box::new(LimitedStore::new(
        Box::new(MemoryStore::new()),
        cli.memory_limit,
        OverflowPolicy::Spill(Box::new(file)),
    ))
}

/// Print the archive listing as a table, sorted by name.
fn print_entries<R: httpreaderat::ReadAt>(archive: &ZipArchive<R>) {
    if !archive.comment().is_empty() {
        println!("Comment: {}", archive.comment());
    }

    let mut entries: Vec<&ZipEntry> = archive.entries().iter().collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    println!(
        "{:<10}  {:<10}  {:>12}  {:>12}  {:<19}  {}",
        "Mode", "CRC32", "Compressed", "Size", "Modified", "Name"
    );
    println!("{}", "-".repeat(80));

    for entry in entries {
        let (year, month, day, hour, minute, second) = entry.modified();
        print!(
            "{:<10}  0x{:08x}  {:>12}  {:>12}  {:04}-{:02}-{:02} {:02}:{:02}:{:02}  {}",
            entry.mode_string(),
            entry.crc32,
            entry.compressed_size,
            entry.uncompressed_size,
            year,
            month,
            day,
            hour,
            minute,
            second,
            entry.name
        );
        if entry.comment.is_empty() {
            println!();
        } else {
            println!("  ({})", entry.comment);
        }
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
