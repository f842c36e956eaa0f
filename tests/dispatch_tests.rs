//! Dispatcher tests against a local HTTP stub.

use std::io::Write;
use std::sync::{Arc, Mutex};

use f007th_send::buffer::{FixedBuffer, PAYLOAD_BUFFER_SIZE, RESPONSE_BUFFER_SIZE};
use f007th_send::change::ChangeMask;
use f007th_send::config::{Protocol, ServerTarget, Verbosity};
use f007th_send::dispatch::{Dispatcher, ReqwestTransport};
use f007th_send::encoder;
use f007th_send::message::{ReceivedMessage, SensorReading};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

// ---------------------------------------------------------------------------
// HTTP stub
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CapturedRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Accept one connection, capture the request and answer with `status`.
async fn serve_once(status: u16, reply: Vec<u8>) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/sensors", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let captured = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            buf.extend_from_slice(&chunk[..n]);

            let mut headers = [httparse::EMPTY_HEADER; 32];
            let mut req = httparse::Request::new(&mut headers);
            let httparse::Status::Complete(head_len) = req.parse(&buf).unwrap() else {
                continue;
            };
            let headers: Vec<(String, String)> = req
                .headers
                .iter()
                .map(|h| {
                    (
                        h.name.to_string(),
                        String::from_utf8_lossy(h.value).into_owned(),
                    )
                })
                .collect();
            let content_length = headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() < head_len + content_length {
                continue;
            }
            break CapturedRequest {
                method: req.method.unwrap_or_default().to_string(),
                path: req.path.unwrap_or_default().to_string(),
                headers,
                body: buf[head_len..head_len + content_length].to_vec(),
            };
        };

        let head = format!(
            "HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            reply.len()
        );
        let _ = stream.write_all(head.as_bytes()).await;
        let _ = stream.write_all(&reply).await;
        let _ = stream.shutdown().await;
        captured
    });

    (url, handle)
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn reading() -> SensorReading {
    SensorReading {
        channel: 1,
        rolling_code: 77,
        temperature_f10: 725,
        humidity: 40,
        battery_ok: true,
    }
}

fn dispatcher(url: &str, protocol: Protocol) -> Dispatcher<ReqwestTransport> {
    let target = ServerTarget::new(url, protocol).unwrap();
    Dispatcher::new(
        ReqwestTransport::new(Some(std::time::Duration::from_secs(5))),
        target,
        Verbosity::default(),
    )
}

fn encoded(protocol: Protocol, mask: ChangeMask) -> FixedBuffer {
    let mut payload = FixedBuffer::with_capacity(PAYLOAD_BUFFER_SIZE);
    let message = ReceivedMessage::decoded(reading(), true);
    assert!(encoder::encode(&message, protocol, &mut payload, mask, false) > 0);
    payload
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rest_put_with_temperature_only_succeeds_on_200() {
    let (url, server) = serve_once(200, b"{\"ok\":true}".to_vec()).await;
    let d = dispatcher(&url, Protocol::Rest);
    let payload = encoded(Protocol::Rest, ChangeMask::TEMPERATURE);
    let mut response = FixedBuffer::with_capacity(RESPONSE_BUFFER_SIZE);

    assert!(d.dispatch(&payload, &mut response).await);
    assert_eq!(response.to_string_lossy(), "{\"ok\":true}");

    let req = server.await.unwrap();
    assert_eq!(req.method, "PUT");
    assert_eq!(req.path, "/api/sensors");
    let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"type": "F007TH", "channel": 1, "rolling_code": 77, "temperature": 72.5})
    );
}

#[tokio::test]
async fn rest_request_carries_json_headers() {
    let (url, server) = serve_once(200, Vec::new()).await;
    let d = dispatcher(&url, Protocol::Rest);
    let mut response = FixedBuffer::with_capacity(RESPONSE_BUFFER_SIZE);
    assert!(d.dispatch(&encoded(Protocol::Rest, ChangeMask::ALL), &mut response).await);

    let req = server.await.unwrap();
    assert_eq!(req.header("content-type"), Some("application/json"));
    assert_eq!(req.header("accept"), Some("application/json"));
    assert_eq!(req.header("charsets"), Some("utf-8"));
    assert!(response.is_empty());
}

#[tokio::test]
async fn influxdb_post_succeeds_on_204() {
    let (url, server) = serve_once(204, Vec::new()).await;
    let d = dispatcher(&url, Protocol::InfluxDb);
    let mut response = FixedBuffer::with_capacity(RESPONSE_BUFFER_SIZE);
    assert!(d.dispatch(&encoded(Protocol::InfluxDb, ChangeMask::ALL), &mut response).await);

    let req = server.await.unwrap();
    assert_eq!(req.method, "POST");
    assert_eq!(req.header("content-type"), None);
    assert_ne!(req.header("accept"), Some("application/json"));
    assert_eq!(req.header("charsets"), None);
    assert_eq!(
        req.body_text(),
        "F007TH,channel=1,rolling_code=77 temperature=72.5,humidity=40i,battery_ok=true"
    );
}

#[tokio::test]
async fn influxdb_rejects_200() {
    let (url, server) = serve_once(200, Vec::new()).await;
    let d = dispatcher(&url, Protocol::InfluxDb);
    let mut response = FixedBuffer::with_capacity(RESPONSE_BUFFER_SIZE);
    assert!(!d.dispatch(&encoded(Protocol::InfluxDb, ChangeMask::ALL), &mut response).await);
    server.await.unwrap();
}

#[tokio::test]
async fn status_mismatch_is_logged_with_status() {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let (url, server) = serve_once(500, b"boom".to_vec()).await;
    let d = dispatcher(&url, Protocol::Rest);
    let mut response = FixedBuffer::with_capacity(RESPONSE_BUFFER_SIZE);
    assert!(!d.dispatch(&encoded(Protocol::Rest, ChangeMask::ALL), &mut response).await);
    server.await.unwrap();

    let logs = capture.contents();
    assert!(logs.contains("Got HTTP status code 500"), "{logs}");
    assert!(!logs.contains("Failed to connect to server"), "{logs}");
    assert_eq!(response.to_string_lossy(), "boom");
}

#[tokio::test]
async fn connection_refused_is_a_connect_failure() {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/write?db=sensors", listener.local_addr().unwrap());
    drop(listener);

    for protocol in [Protocol::Rest, Protocol::InfluxDb] {
        let d = dispatcher(&url, protocol);
        let mut response = FixedBuffer::with_capacity(RESPONSE_BUFFER_SIZE);
        assert!(!d.dispatch(&encoded(protocol, ChangeMask::ALL), &mut response).await);
        assert!(response.is_empty());
    }

    let logs = capture.contents();
    assert!(logs.contains(&format!("Failed to connect to server {url}")), "{logs}");
    assert!(!logs.contains("Got HTTP status code"), "{logs}");
}

#[tokio::test]
async fn oversized_reply_is_truncated() {
    let reply = vec![b'r'; 64 * 1024];
    let (url, server) = serve_once(200, reply).await;
    let d = dispatcher(&url, Protocol::Rest);
    let mut response = FixedBuffer::with_capacity(RESPONSE_BUFFER_SIZE);

    assert!(d.dispatch(&encoded(Protocol::Rest, ChangeMask::ALL), &mut response).await);
    assert_eq!(response.len(), RESPONSE_BUFFER_SIZE - 1);
    assert!(response.is_terminated());
    assert!(response.as_bytes().iter().all(|b| *b == b'r'));
    server.await.unwrap();
}
