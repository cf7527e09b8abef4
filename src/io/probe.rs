//! Capability probing.
//!
//! One request carrying `Range: bytes=0-0` tells us whether the server
//! honors ranges (206) or sends the whole body (200). In the second case the
//! response is kept so its body can feed the fallback store directly.

use reqwest::header::{
    CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, HeaderName, LAST_MODIFIED, RANGE,
};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;

use crate::error::{Error, Result};

/// Method, URL and headers of the caller's request, replayed on every
/// request this crate sends.
#[derive(Debug, Clone)]
pub(crate) struct RequestTemplate {
    method: Method,
    url: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl RequestTemplate {
    pub(crate) fn from_request(request: &Request) -> Self {
        let mut headers = request.headers().clone();
        // we own the Range header
        headers.remove(RANGE);

        Self {
            method: request.method().clone(),
            url: request.url().clone(),
            headers,
            timeout: request.timeout().copied(),
        }
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    /// Build a request from the template, asking for the inclusive byte
    /// range `start..=end` when one is given.
    pub(crate) fn build(&self, client: &Client, range: Option<(u64, u64)>) -> RequestBuilder {
        let mut builder = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some((start, end)) = range {
            builder = builder.header(RANGE, format!("bytes={}-{}", start, end));
        }

        builder
    }
}

/// What the probe learned about the server.
pub(crate) enum Capability {
    /// Range requests work; `size` comes from `Content-Range`.
    Ranged { size: u64 },
    /// Range requests are ignored. `body` holds the probe response when it
    /// already carries the full resource (status 200).
    Full { body: Option<Response> },
}

pub(crate) struct Probe {
    pub(crate) capability: Capability,
    pub(crate) last_modified: String,
    pub(crate) content_type: String,
}

/// Send the exploratory request and classify the response.
pub(crate) async fn probe(client: &Client, template: &RequestTemplate) -> Result<Probe> {
    let response = template.build(client, Some((0, 0))).send().await?;
    let status = response.status();

    if !status.is_success() {
        return Err(Error::UnexpectedResponseCode(status.as_u16()));
    }

    let last_modified = header_string(response.headers(), &LAST_MODIFIED);
    let content_type = header_string(response.headers(), &CONTENT_TYPE);

    let capability = if status == StatusCode::PARTIAL_CONTENT {
        let size = content_range(response.headers())?.total;
        Capability::Ranged { size }
    } else if status == StatusCode::OK {
        Capability::Full {
            body: Some(response),
        }
    } else {
        // Successful but not a full body (e.g. 204, 203): refetch later.
        Capability::Full { body: None }
    };

    Ok(Probe {
        capability,
        last_modified,
        content_type,
    })
}

/// Header value as a string, empty when absent.
fn header_string(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// Byte range a 206 response claims to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub(crate) start: u64,
    pub(crate) end: u64,
    pub(crate) total: u64,
}

pub(crate) fn content_range(headers: &HeaderMap) -> Result<ContentRange> {
    let value = header_string(headers, &CONTENT_RANGE);
    parse_content_range(&value).ok_or(Error::InvalidHeader {
        name: "Content-Range",
        value,
    })
}

/// Declared body length, if the response carries one.
pub(crate) fn content_length(headers: &HeaderMap) -> Result<Option<u64>> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(v) => {
            let value = String::from_utf8_lossy(v.as_bytes()).into_owned();
            value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::InvalidHeader {
                    name: "Content-Length",
                    value,
                })
        }
    }
}

/// Parse `bytes <start>-<end>/<total>`.
///
/// An unknown total (`*`) is rejected since reads need a known size.
pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?;
    if !rest.starts_with(' ') {
        return None;
    }
    let (range, total) = rest.trim_start().split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    let total: u64 = total.trim().parse().ok()?;

    if start > end || end >= total {
        return None;
    }
    Some(ContentRange { start, end, total })
}
