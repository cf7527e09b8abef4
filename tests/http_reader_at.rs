use std::sync::Arc;

use rand::RngCore;
use reqwest::Client;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use httpreaderat::{
    Error, FileStore, HttpReaderAt, LimitedStore, MemoryStore, OverflowPolicy, ReadAt,
};

const MOD_TIME: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

fn random_content(len: usize) -> Vec<u8> {
    let mut content = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut content);
    content
}

fn range_header(request: &Request) -> Option<String> {
    request
        .headers
        .get("range")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Serves `content`, honoring single `bytes=start-end` ranges.
struct Ranged {
    content: Vec<u8>,
    content_type: &'static str,
}

impl Respond for Ranged {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let len = self.content.len() as u64;
        let base = |status: u16| {
            ResponseTemplate::new(status)
                .insert_header("Content-Type", self.content_type)
                .insert_header("Last-Modified", MOD_TIME)
        };

        let Some(range) = range_header(request) else {
            return base(200).set_body_bytes(self.content.clone());
        };
        let (start, end) = range
            .strip_prefix("bytes=")
            .and_then(|r| r.split_once('-'))
            .and_then(|(s, e)| Some((s.parse::<u64>().ok()?, e.parse::<u64>().ok()?)))
            .expect("test client sends bytes=start-end");

        if start >= len {
            return base(416).insert_header("Content-Range", format!("bytes */{}", len));
        }
        let end = end.min(len - 1);
        base(206)
            .insert_header("Content-Range", format!("bytes {}-{}/{}", start, end, len))
            .set_body_bytes(self.content[start as usize..=end as usize].to_vec())
    }
}

/// Ignores `Range` and always sends the full body.
struct NotRanged {
    content: Vec<u8>,
}

impl Respond for NotRanged {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("Content-Type", "application/octet-stream")
            .insert_header("Last-Modified", MOD_TIME)
            .set_body_bytes(self.content.clone())
    }
}

async fn server_with(content: &[u8]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ranged-content"))
        .respond_with(Ranged {
            content: content.to_vec(),
            content_type: "some-random-bytes",
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/not-ranged-content"))
        .respond_with(NotRanged {
            content: content.to_vec(),
        })
        .mount(&server)
        .await;
    server
}

fn get(client: &Client, server: &MockServer, route: &str) -> reqwest::Request {
    client
        .get(format!("{}{}", server.uri(), route))
        .build()
        .unwrap()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

async fn read_all(reader: &HttpReaderAt) -> Vec<u8> {
    let mut out = vec![0u8; reader.size() as usize];
    for (i, chunk) in out.chunks_mut(3000).enumerate() {
        let n = reader.read_at(i as u64 * 3000, chunk).await.unwrap();
        assert_eq!(n, chunk.len());
    }
    out
}

#[tokio::test]
async fn basic_scenario() {
    let content = random_content(10 * 1024);
    let server = server_with(&content).await;
    let client = Client::new();

    let reader = HttpReaderAt::new(client.clone(), get(&client, &server, "/ranged-content"), None)
        .await
        .unwrap();

    assert!(reader.supports_range());
    assert_eq!(reader.size(), content.len() as u64);
    assert_eq!(reader.last_modified(), MOD_TIME);
    assert_eq!(reader.content_type(), "some-random-bytes");

    // one chunk in ~middle of content
    let mut chunk = vec![0u8; 2 * 1024];
    let n = reader.read_at(4 * 1024, &mut chunk).await.unwrap();
    assert_eq!(n, chunk.len());
    assert_eq!(chunk, &content[4 * 1024..6 * 1024]);
    assert_eq!(reader.transferred_bytes(), 2 * 1024);

    assert_eq!(read_all(&reader).await, content);
    reader.close().unwrap();
}

#[tokio::test]
async fn no_range_support_without_store() {
    let server = server_with(&random_content(1024)).await;
    let client = Client::new();

    let err = HttpReaderAt::new(
        client.clone(),
        get(&client, &server, "/not-ranged-content"),
        None,
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, Error::UnsupportedRange), "{err}");
}

#[tokio::test]
async fn no_range_support_with_store() {
    let content = random_content(10 * 1024);
    let server = server_with(&content).await;
    let client = Client::new();

    let reader = HttpReaderAt::new(
        client.clone(),
        get(&client, &server, "/not-ranged-content"),
        Some(Box::new(MemoryStore::new())),
    )
    .await
    .unwrap();

    assert!(!reader.supports_range());
    assert_eq!(reader.size(), content.len() as u64);
    assert_eq!(reader.last_modified(), MOD_TIME);
    assert_eq!(reader.content_type(), "application/octet-stream");
    assert_eq!(reader.transferred_bytes(), content.len() as u64);

    let mut chunk = vec![0u8; 2 * 1024];
    reader.read_at(4 * 1024, &mut chunk).await.unwrap();
    assert_eq!(chunk, &content[4 * 1024..6 * 1024]);
    assert_eq!(read_all(&reader).await, content);

    let mut tail = vec![0u8; 2 * 1024];
    let err = reader.read_at(9 * 1024, &mut tail).await.unwrap_err();
    assert!(matches!(err, Error::EndOfData { transferred: 1024 }));
    assert_eq!(&tail[..1024], &content[9 * 1024..]);

    // the probe response doubled as the download
    assert_eq!(request_count(&server).await, 1);
    reader.close().unwrap();
}

#[tokio::test]
async fn fallback_spills_to_file_store() {
    let content = random_content(10 * 1024);
    let server = server_with(&content).await;
    let client = Client::new();
    let dir = tempfile::tempdir().unwrap();

    let store = LimitedStore::new(
        Box::new(MemoryStore::new()),
        4 * 1024,
        OverflowPolicy::Spill(Box::new(FileStore::in_dir(dir.path()))),
    );
    let reader = HttpReaderAt::new(
        client.clone(),
        get(&client, &server, "/not-ranged-content"),
        Some(Box::new(store)),
    )
    .await
    .unwrap();

    assert_eq!(reader.size(), content.len() as u64);
    assert_eq!(read_all(&reader).await, content);
    reader.close().unwrap();
}

#[tokio::test]
async fn fallback_fails_when_store_limit_exceeded() {
    let server = server_with(&random_content(10 * 1024)).await;
    let client = Client::new();

    let store = LimitedStore::new(Box::new(MemoryStore::new()), 5 * 1024, OverflowPolicy::Fail);
    let err = HttpReaderAt::new(
        client.clone(),
        get(&client, &server, "/not-ranged-content"),
        Some(Box::new(store)),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, Error::StoreLimitExceeded { limit: 5120 }), "{err}");
}

#[tokio::test]
async fn unexpected_code() {
    let server = server_with(&random_content(16)).await;
    let client = Client::new();

    let err = HttpReaderAt::new(client.clone(), get(&client, &server, "/non-existing"), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::UnexpectedResponseCode(404)), "{err}");
    assert_eq!(err.status_code(), Some(404));
}

#[tokio::test]
async fn requested_more_data_than_server_could_give() {
    let content = random_content(10 * 1024);
    let server = server_with(&content).await;
    let client = Client::new();

    let reader = HttpReaderAt::new(client.clone(), get(&client, &server, "/ranged-content"), None)
        .await
        .unwrap();

    let mut chunk = vec![0u8; 2 * 1024];
    let off = 9 * 1024;
    let err = reader.read_at(off, &mut chunk).await.unwrap_err();
    assert!(err.is_end_of_data(), "{err}");
    assert_eq!(err.transferred() as u64, content.len() as u64 - off);
    assert_eq!(&chunk[..err.transferred()], &content[off as usize..]);
}

#[tokio::test]
async fn offset_past_end_sends_no_request() {
    let content = random_content(1024);
    let server = server_with(&content).await;
    let client = Client::new();

    let reader = HttpReaderAt::new(client.clone(), get(&client, &server, "/ranged-content"), None)
        .await
        .unwrap();
    let before = request_count(&server).await;

    let mut buf = [0u8; 16];
    for offset in [1024, 4096, u64::MAX] {
        let err = reader.read_at(offset, &mut buf).await.unwrap_err();
        assert!(matches!(err, Error::EndOfData { transferred: 0 }));
    }
    assert_eq!(reader.read_at(0, &mut []).await.unwrap(), 0);

    assert_eq!(request_count(&server).await, before);
}

#[tokio::test]
async fn correctly_passes_headers() {
    let server = MockServer::start().await;
    Mock::given(header("Authorization", "Bearer test"))
        .and(header("X-Header-1", "value1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("some data"))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new();
    let request = client
        .get(server.uri())
        .header("Authorization", "Bearer test")
        .header("X-Header-1", "value1")
        .build()
        .unwrap();

    let reader = HttpReaderAt::new(client, request, Some(Box::new(MemoryStore::new())))
        .await
        .unwrap();
    assert_eq!(reader.size(), 9);
}

#[tokio::test]
async fn range_requests_replay_headers() {
    let content = random_content(4096);
    let server = MockServer::start().await;
    Mock::given(header("Authorization", "Bearer test"))
        .and(header("X-Header-1", "value1"))
        .respond_with(Ranged {
            content: content.clone(),
            content_type: "application/zip",
        })
        .expect(3)
        .mount(&server)
        .await;

    let client = Client::new();
    let request = client
        .get(format!("{}/private.zip", server.uri()))
        .header("Authorization", "Bearer test")
        .header("X-Header-1", "value1")
        .build()
        .unwrap();

    let reader = HttpReaderAt::new(client, request, None).await.unwrap();
    let mut buf = [0u8; 100];
    reader.read_at(3000, &mut buf).await.unwrap();
    reader.read_at(10, &mut buf).await.unwrap();
    assert_eq!(&buf[..], &content[10..110]);

    let ranges: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| range_header(r).unwrap())
        .collect();
    assert_eq!(ranges, ["bytes=0-0", "bytes=3000-3099", "bytes=10-109"]);
}

#[tokio::test]
async fn range_read_rejects_full_response() {
    /// Honors the probe, then starts answering 200.
    struct ProbeOnly(Ranged);

    impl Respond for ProbeOnly {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            if range_header(request).as_deref() == Some("bytes=0-0") {
                self.0.respond(request)
            } else {
                ResponseTemplate::new(200).set_body_bytes(self.0.content.clone())
            }
        }
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ProbeOnly(Ranged {
            content: random_content(512),
            content_type: "",
        }))
        .mount(&server)
        .await;

    let client = Client::new();
    let reader = HttpReaderAt::new(client.clone(), get(&client, &server, "/flaky"), None)
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let err = reader.read_at(100, &mut buf).await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedResponseCode(200)), "{err}");
    assert_eq!(err.transferred(), 0);
}

#[tokio::test]
async fn range_read_rejects_shifted_content_range() {
    /// Honors the probe, then always serves the first bytes of the content.
    struct AlwaysFromStart(Ranged);

    impl Respond for AlwaysFromStart {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            if range_header(request).as_deref() == Some("bytes=0-0") {
                return self.0.respond(request);
            }
            let len = self.0.content.len();
            ResponseTemplate::new(206)
                .insert_header("Content-Range", format!("bytes 0-63/{}", len))
                .set_body_bytes(self.0.content[..64].to_vec())
        }
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(AlwaysFromStart(Ranged {
            content: random_content(512),
            content_type: "",
        }))
        .mount(&server)
        .await;

    let client = Client::new();
    let reader = HttpReaderAt::new(client.clone(), get(&client, &server, "/shifted"), None)
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let err = reader.read_at(100, &mut buf).await.unwrap_err();
    assert!(
        matches!(&err, Error::InvalidHeader { name: "Content-Range", value } if value == "bytes 0-63/512"),
        "{err}"
    );
    assert_eq!(reader.read_at(0, &mut buf).await.unwrap(), 64);
}

#[tokio::test]
async fn probe_without_body_triggers_one_download() {
    /// Answers range requests with 204 and plain requests with the content.
    struct NoContentOnRange(Vec<u8>);

    impl Respond for NoContentOnRange {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            match range_header(request) {
                Some(_) => ResponseTemplate::new(204),
                None => ResponseTemplate::new(200).set_body_bytes(self.0.clone()),
            }
        }
    }

    let content = random_content(3000);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(NoContentOnRange(content.clone()))
        .expect(2)
        .mount(&server)
        .await;

    let client = Client::new();
    let reader = HttpReaderAt::new(
        client.clone(),
        get(&client, &server, "/odd"),
        Some(Box::new(MemoryStore::new())),
    )
    .await
    .unwrap();

    assert!(!reader.supports_range());
    assert_eq!(reader.size(), 3000);
    assert_eq!(read_all(&reader).await, content);
}

#[tokio::test]
async fn invalid_content_range_fails_construction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 0-0/*")
                .set_body_bytes(vec![0u8]),
        )
        .mount(&server)
        .await;

    let client = Client::new();
    let err = HttpReaderAt::new(client.clone(), get(&client, &server, "/unknown-size"), None)
        .await
        .err()
        .unwrap();
    assert!(
        matches!(err, Error::InvalidHeader { name: "Content-Range", .. }),
        "{err}"
    );
}

#[tokio::test]
async fn concurrent_out_of_order_reads() {
    let content = random_content(64 * 1024);
    let server = server_with(&content).await;
    let client = Client::new();

    let reader = Arc::new(
        HttpReaderAt::new(client.clone(), get(&client, &server, "/ranged-content"), None)
            .await
            .unwrap(),
    );

    let offsets = [60_000u64, 0, 31_337, 4096, 50_000, 12_345, 63_000, 20_000];
    let tasks: Vec<_> = offsets
        .iter()
        .map(|&offset| {
            let reader = reader.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1000];
                let n = reader.read_at(offset, &mut buf).await.unwrap();
                (offset, buf, n)
            })
        })
        .collect();

    for task in tasks {
        let (offset, buf, n) = task.await.unwrap();
        assert_eq!(n, 1000);
        assert_eq!(buf, &content[offset as usize..offset as usize + 1000]);
    }
}

#[tokio::test]
async fn both_paths_agree_on_tail_reads() {
    let content = random_content(5000);
    let server = server_with(&content).await;
    let client = Client::new();

    let ranged = HttpReaderAt::new(client.clone(), get(&client, &server, "/ranged-content"), None)
        .await
        .unwrap();
    let stored = HttpReaderAt::new(
        client.clone(),
        get(&client, &server, "/not-ranged-content"),
        Some(httpreaderat::default_store()),
    )
    .await
    .unwrap();
    assert_eq!(ranged.size(), stored.size());

    for (offset, len) in [(0u64, 5000usize), (4999, 1), (4000, 2000), (1, 7000)] {
        let mut a = vec![0u8; len];
        let mut b = vec![0u8; len];
        let ra = ranged.read_at(offset, &mut a).await;
        let rb = stored.read_at(offset, &mut b).await;

        let expected = (content.len() - offset as usize).min(len);
        match (ra, rb) {
            (Ok(x), Ok(y)) => assert_eq!((x, y), (len, len)),
            (Err(x), Err(y)) => {
                assert_eq!(x.transferred(), expected);
                assert_eq!(y.transferred(), expected);
                assert!(x.is_end_of_data() && y.is_end_of_data());
            }
            other => panic!("paths disagree: {other:?}"),
        }
        assert_eq!(a[..expected], b[..expected]);
        assert_eq!(&a[..expected], &content[offset as usize..offset as usize + expected]);
    }
}
