//! One-shot HTTP server for exercising provider clients in tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Request line, headers and body as received by the stub.
pub struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then_some(value.trim())
        })
    }
}

/// Serves a single request with `status` and a JSON `body`, returning the
/// base URL and a handle resolving to the captured request.
pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let address = listener.local_addr().expect("stub address");
    let response = format!(
        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept stub connection");
        let mut received = Vec::new();
        let mut buffer = [0u8; 4096];

        let header_end = loop {
            let read = stream.read(&mut buffer).await.expect("read request");
            assert!(read > 0, "connection closed before headers");
            received.extend_from_slice(&buffer[..read]);
            if let Some(position) = find_subsequence(&received, b"\r\n\r\n") {
                break position + 4;
            }
        };

        let head = String::from_utf8_lossy(&received[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        while received.len() < header_end + content_length {
            let read = stream.read(&mut buffer).await.expect("read body");
            if read == 0 {
                break;
            }
            received.extend_from_slice(&buffer[..read]);
        }

        stream
            .write_all(response.as_bytes())
            .await
            .expect("write stub response");
        stream.shutdown().await.ok();

        CapturedRequest {
            head,
            body: String::from_utf8_lossy(&received[header_end..]).to_string(),
        }
    });

    (format!("http://{address}"), handle)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
