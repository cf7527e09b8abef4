use async_trait::async_trait;
use reqwest::{Client, Request, Response, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

use super::ReadAt;
use super::probe::{self, Capability, RequestTemplate};
use crate::error::{Error, Result};
use crate::store::Store;

/// Random access reader over a remote HTTP resource
///
/// Reads are served with one HTTP Range request each. If the server ignores
/// range requests, the whole resource is downloaded into the store given at
/// construction and reads are served from there instead.
pub struct HttpReaderAt {
    size: u64,
    last_modified: String,
    content_type: String,
    source: Source,
    transferred_bytes: AtomicU64,
}

enum Source {
    Range {
        client: Client,
        template: RequestTemplate,
    },
    Store(Box<dyn Store>),
}

impl HttpReaderAt {
    /// Create a new reader for the resource addressed by `request`
    ///
    /// The method, URL and headers of `request` are replayed on every request
    /// sent to the server. This probes the server with a one-byte range
    /// request. When the server answers with the full body instead, the body
    /// is streamed into `store` before this returns; without a store that
    /// fails with [`Error::UnsupportedRange`].
    pub async fn new(
        client: Client,
        request: Request,
        store: Option<Box<dyn Store>>,
    ) -> Result<Self> {
        let template = RequestTemplate::from_request(&request);
        let probe = probe::probe(&client, &template).await?;

        match probe.capability {
            Capability::Ranged { size } => {
                debug!(url = %template.url(), size, "server supports range requests");

                Ok(Self {
                    size,
                    last_modified: probe.last_modified,
                    content_type: probe.content_type,
                    source: Source::Range { client, template },
                    transferred_bytes: AtomicU64::new(0),
                })
            }
            Capability::Full { body } => {
                let Some(mut store) = store else {
                    return Err(Error::UnsupportedRange);
                };
                debug!(url = %template.url(), "server ignores range requests, downloading into store");

                let transferred_bytes = AtomicU64::new(0);
                let expected =
                    match download(&client, &template, body, &mut *store, &transferred_bytes).await
                    {
                        Ok(expected) => expected,
                        Err(e) => {
                            // The error that stopped the download is the one reported.
                            let _ = store.release();
                            return Err(e);
                        }
                    };

                let size = store.size();
                if let Some(expected) = expected
                    && expected != size
                {
                    warn!(expected, size, "downloaded size differs from Content-Length");
                }
                debug!(size, "download complete");

                Ok(Self {
                    size,
                    last_modified: probe.last_modified,
                    content_type: probe.content_type,
                    source: Source::Store(store),
                    transferred_bytes,
                })
            }
        }
    }

    /// Total size of the resource in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `Last-Modified` header of the probe response, empty if absent
    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    /// `Content-Type` header of the probe response, empty if absent
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Whether reads go to the server as range requests
    pub fn supports_range(&self) -> bool {
        matches!(self.source, Source::Range { .. })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Release the backing store, if any.
    pub fn close(self) -> Result<()> {
        match self.source {
            Source::Store(mut store) => store.release(),
            Source::Range { .. } => Ok(()),
        }
    }

    async fn read_range(
        &self,
        client: &Client,
        template: &RequestTemplate,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize> {
        let end = offset + buf.len() as u64 - 1;
        trace!(offset, end, "range request");

        let mut response = template.build(client, Some((offset, end))).send().await?;
        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(Error::UnexpectedResponseCode(response.status().as_u16()));
        }
        let range = probe::content_range(response.headers())?;
        if range.start != offset {
            return Err(Error::InvalidHeader {
                name: "Content-Range",
                value: format!("bytes {}-{}/{}", range.start, range.end, range.total),
            });
        }

        let mut received = 0;
        while received < buf.len() {
            let Some(chunk) = response.chunk().await? else {
                break;
            };
            let n = chunk.len().min(buf.len() - received);
            buf[received..received + n].copy_from_slice(&chunk[..n]);
            received += n;
        }
        self.transferred_bytes
            .fetch_add(received as u64, Ordering::Relaxed);

        self.complete(offset, buf.len(), received)
    }

    fn read_store(&self, store: &dyn Store, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let received = store.read_at(offset, buf)?;
        self.complete(offset, buf.len(), received)
    }

    /// Turn a byte count into the read result.
    ///
    /// A short count is only end-of-data when the requested range crosses the
    /// end of the resource; anything else lost bytes on the way.
    fn complete(&self, offset: u64, requested: usize, received: usize) -> Result<usize> {
        if received >= requested {
            return Ok(requested);
        }

        let available = self.size - offset;
        if offset + requested as u64 > self.size && received as u64 >= available {
            return Err(Error::EndOfData {
                transferred: received,
            });
        }

        Err(Error::TruncatedBody {
            expected: available.min(requested as u64) as usize,
            received,
        })
    }
}

#[async_trait]
impl ReadAt for HttpReaderAt {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.size {
            return Err(Error::EndOfData { transferred: 0 });
        }
        if buf.is_empty() {
            return Ok(0);
        }

        match &self.source {
            Source::Range { client, template } => {
                self.read_range(client, template, offset, buf).await
            }
            Source::Store(store) => self.read_store(&**store, offset, buf),
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Stream the full resource into `store`.
///
/// Uses the probe response when it already carries the body, otherwise sends
/// the request again without a range. Returns the declared `Content-Length`.
async fn download(
    client: &Client,
    template: &RequestTemplate,
    body: Option<Response>,
    store: &mut dyn Store,
    transferred: &AtomicU64,
) -> Result<Option<u64>> {
    let mut response = match body {
        Some(response) => response,
        None => {
            let response = template.build(client, None).send().await?;
            if !response.status().is_success() {
                return Err(Error::UnexpectedResponseCode(response.status().as_u16()));
            }
            response
        }
    };
    let expected = probe::content_length(response.headers())?;

    while let Some(chunk) = response.chunk().await? {
        store.write(&chunk)?;
        transferred.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }

    Ok(expected)
}
