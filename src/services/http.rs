use crate::constants::{limits, network};
use crate::errors::ToolError;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::fmt;
use std::time::Duration;

/// Shared outbound client. One per process; reqwest pools connections.
pub fn build_client() -> Result<Client, ToolError> {
    Client::builder()
        .user_agent(network::USER_AGENT)
        .connect_timeout(Duration::from_millis(network::TIMEOUT_CONNECTION_MS))
        .build()
        .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))
}

/// A response read to the end, or to the first `MAX_BODY_BYTES`.
#[derive(Debug)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug)]
pub enum FetchError {
    TimedOut { after_ms: u64 },
    Transport(reqwest::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::TimedOut { after_ms } => write!(f, "timed out after {} ms", after_ms),
            FetchError::Transport(err) => write!(f, "{}", describe_transport_error(err)),
        }
    }
}

/// Sends `request` and reads its body under one deadline. A body that stalls
/// or breaks off counts the same as a failed send.
pub async fn fetch(request: RequestBuilder, timeout_ms: u64) -> Result<Fetched, FetchError> {
    let exchange = async {
        let mut response = request.send().await.map_err(FetchError::Transport)?;
        let status = response.status();
        let body = read_capped(&mut response)
            .await
            .map_err(FetchError::Transport)?;
        Ok::<Fetched, FetchError>(Fetched { status, body })
    };
    tokio::time::timeout(Duration::from_millis(timeout_ms), exchange)
        .await
        .map_err(|_| FetchError::TimedOut {
            after_ms: timeout_ms,
        })?
}

async fn read_capped(response: &mut Response) -> Result<String, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limits::MAX_BODY_BYTES - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn clip_detail(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= limits::MAX_ERROR_DETAIL {
        return trimmed.to_string();
    }
    let mut end = limits::MAX_ERROR_DETAIL;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one request with headers and half a body, then goes quiet.
    async fn stalled_body_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"displayName\":")
                    .await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        });
        format!("http://{}/", addr)
    }

    /// Answers one request with a short body and closes the connection.
    async fn truncated_body_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n{\"access_token\":")
                    .await;
            }
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn stalled_body_is_bounded_by_the_deadline() {
        let url = stalled_body_server().await;
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            fetch(Client::new().get(&url), 200),
        )
        .await
        .expect("fetch must give up on its own");
        match outcome {
            Err(err @ FetchError::TimedOut { after_ms: 200 }) => {
                assert_eq!(err.to_string(), "timed out after 200 ms");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_cut_short_is_a_transport_error() {
        let url = truncated_body_server().await;
        let outcome = fetch(Client::new().get(&url), 5_000).await;
        assert!(matches!(outcome, Err(FetchError::Transport(_))), "{outcome:?}");
    }

    #[test]
    fn long_details_are_clipped_on_char_boundaries() {
        let long = "é".repeat(limits::MAX_ERROR_DETAIL);
        let clipped = clip_detail(&long);
        assert!(clipped.ends_with("..."));
        assert!(clipped.len() <= limits::MAX_ERROR_DETAIL + 3);
    }
}
