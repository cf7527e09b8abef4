use clap::Parser;
use std::path::PathBuf;

use crate::io::DEFAULT_BUFFER_SIZE;
use crate::store::DEFAULT_MEMORY_LIMIT;

#[derive(Parser, Debug)]
#[command(name = "remotezip")]
#[command(version)]
#[command(about = "List or extract files of a remote ZIP archive without downloading it", long_about = None)]
#[command(after_help = "Examples:\n  \
  remotezip -l https://example.com/archive.zip             list archive contents\n  \
  remotezip -f docs/readme.txt https://example.com/a.zip   print one file to stdout\n  \
  remotezip -H 'Authorization: Bearer X' -l https://example.com/private.zip")]
pub struct Cli {
    /// Remote ZIP archive URL
    #[arg(value_name = "URL")]
    pub url: String,

    /// List files inside the archive
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Path of a file inside the archive to write to stdout
    #[arg(short = 'f', long, value_name = "PATH", required_unless_present = "list")]
    pub file: Option<String>,

    /// Extra request header, e.g. "Authorization: Bearer X"
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Read buffer size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Bytes kept in memory before a full download spills to disk
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MEMORY_LIMIT)]
    pub memory_limit: u64,

    /// Directory for the temporary download file
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Fail instead of downloading when the server ignores range requests
    #[arg(long)]
    pub no_fallback: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Verbose logging (-vv for more)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode, no transfer summary
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    /// Default tracing filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "httpreaderat=debug",
            _ => "httpreaderat=trace",
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME: VALUE, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {:?}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
