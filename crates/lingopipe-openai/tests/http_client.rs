//! Wire-level tests against a scripted local HTTP server.

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lingopipe_core::error::TranslateError;
use lingopipe_core::policy::RetryConfig;
use lingopipe_core::TranslateTransport;
use lingopipe_openai::{OpenAiClient, OpenAiConfig};

struct ScriptedResponse {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl ScriptedResponse {
    fn ok(content: &str) -> Self {
        let body = serde_json::json!({
            "choices": [{"message": {"content": content}}]
        })
        .to_string();
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: format!("{{\"error\":\"status {status}\"}}"),
        }
    }

    fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

#[derive(Debug)]
struct CapturedRequest {
    path: String,
    authorization: Option<String>,
    body: String,
}

/// Serve one scripted response per connection, capturing each request.
/// Closes the socket after every response so the client opens a fresh
/// connection per attempt.
async fn spawn_server(
    responses: Vec<ScriptedResponse>,
) -> (String, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for resp in responses {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let header_end = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break None;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&buf) {
                    break Some(pos);
                }
            };
            let Some(header_end) = header_end else { continue };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = header_value(&head, "content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = header_end + 4;
            while buf.len() < body_start + content_length {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let path = head
                .lines()
                .next()
                .and_then(|l| l.split_whitespace().nth(1))
                .unwrap_or_default()
                .to_string();
            tx.send(CapturedRequest {
                path,
                authorization: header_value(&head, "authorization"),
                body: String::from_utf8_lossy(&buf[body_start..]).to_string(),
            })
            .unwrap();

            let mut out = format!(
                "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n",
                resp.status,
                resp.body.len()
            );
            for (name, value) in &resp.headers {
                out.push_str(&format!("{name}: {value}\r\n"));
            }
            out.push_str("\r\n");
            out.push_str(&resp.body);
            stream.write_all(out.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
        }
    });

    (format!("http://{addr}"), rx)
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim().eq_ignore_ascii_case(name)).then(|| v.trim().to_string())
    })
}

fn client_for(base_url: &str, api_key: &str, max_attempts: u32) -> OpenAiClient {
    OpenAiClient::new(OpenAiConfig {
        base_url: Some(base_url.to_string()),
        api_key: api_key.to_string(),
        model: "gpt-4o-mini".to_string(),
        request_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
        },
    })
    .unwrap()
}

#[tokio::test]
async fn posts_payload_and_returns_content() {
    let ndjson = "{\"idx\":1,\"text\":\"Hola\"}";
    let (base, mut rx) = spawn_server(vec![ScriptedResponse::ok(ndjson)]).await;
    let client = client_for(&base, "sk-test", 3);

    let out = client
        .translate("en", "es", "{\"idx\":1,\"text\":\"Hello\"}", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out, ndjson);

    let req = rx.recv().await.unwrap();
    assert_eq!(req.path, "/v1/chat/completions");
    assert_eq!(req.authorization.as_deref(), Some("Bearer sk-test"));
    assert!(req.body.contains("gpt-4o-mini"));
    assert!(req.body.contains("Hello"));
}

#[tokio::test]
async fn rotates_to_next_key_after_rejection() {
    let (base, mut rx) = spawn_server(vec![
        ScriptedResponse::status(429).with_header("Retry-After", "0"),
        ScriptedResponse::ok("{\"idx\":1,\"text\":\"Hola\"}"),
    ])
    .await;
    let client = client_for(&base, "key-aaaa,key-bbbb", 3);

    client
        .translate("en", "es", "{\"idx\":1,\"text\":\"Hello\"}", &CancellationToken::new())
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.authorization.as_deref(), Some("Bearer key-aaaa"));
    assert_eq!(second.authorization.as_deref(), Some("Bearer key-bbbb"));
}

#[tokio::test]
async fn retry_after_zero_retries_immediately() {
    let (base, _rx) = spawn_server(vec![
        ScriptedResponse::status(503).with_header("Retry-After", "0"),
        ScriptedResponse::ok("{\"idx\":1,\"text\":\"Hola\"}"),
    ])
    .await;
    // Backoff of minutes would trip the elapsed assertion if the header
    // override were ignored.
    let client = OpenAiClient::new(OpenAiConfig {
        base_url: Some(base),
        api_key: "sk-test".to_string(),
        model: "gpt-4o-mini".to_string(),
        request_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_secs(300),
            max_delay: Duration::from_secs(300),
            jitter: 0.0,
        },
    })
    .unwrap();

    let started = Instant::now();
    let out = client
        .translate("en", "es", "{\"idx\":1,\"text\":\"Hello\"}", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out, "{\"idx\":1,\"text\":\"Hola\"}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn cancellation_aborts_transport_backoff() {
    // One 429 with no Retry-After pushes the client into computed backoff;
    // the backoff is minutes long so only cancellation can end the call
    // quickly.
    let (base, _rx) = spawn_server(vec![ScriptedResponse::status(429)]).await;
    let client = OpenAiClient::new(OpenAiConfig {
        base_url: Some(base),
        api_key: "sk-test".to_string(),
        model: "gpt-4o-mini".to_string(),
        request_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(300),
            max_delay: Duration::from_secs(300),
            jitter: 0.0,
        },
    })
    .unwrap();

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let started = Instant::now();
    let err = client
        .translate("en", "es", "{\"idx\":1,\"text\":\"Hello\"}", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::Canceled), "got {err:?}");
    assert!(
        started.elapsed() < Duration::from_secs(30),
        "cancellation did not interrupt the backoff sleep"
    );
}

#[tokio::test]
async fn client_error_status_fails_without_retry() {
    let (base, mut rx) = spawn_server(vec![
        ScriptedResponse::status(400),
        ScriptedResponse::ok("never reached"),
    ])
    .await;
    let client = client_for(&base, "sk-test", 5);

    let err = client
        .translate("en", "es", "{\"idx\":1,\"text\":\"Hello\"}", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::Api { status: 400, .. }));

    // Exactly one request was made.
    assert!(rx.recv().await.is_some());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn malformed_success_body_is_retried() {
    let (base, _rx) = spawn_server(vec![
        ScriptedResponse {
            status: 200,
            headers: Vec::new(),
            body: "{\"choices\":[]}".to_string(),
        },
        ScriptedResponse::ok("{\"idx\":1,\"text\":\"Hola\"}"),
    ])
    .await;
    let client = client_for(&base, "sk-test", 3);

    let out = client
        .translate("en", "es", "{\"idx\":1,\"text\":\"Hello\"}", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out, "{\"idx\":1,\"text\":\"Hola\"}");
}
