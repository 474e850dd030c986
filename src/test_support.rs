use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const GOOD_KEY: &str = "good-key";

/// Minimal HTTP/1.1 stand-in for the weather service. Routes on the `q`
/// and `appid` query parameters.
pub async fn spawn_weather_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = stream.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf).to_string();
                let request_line = request.lines().next().unwrap_or_default().to_string();

                if request_line.contains("q=Atlantis") {
                    // hang up without answering
                    return;
                }
                if request_line.contains("q=Slowtown") {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }

                let (status, body) = if !request_line.contains(&format!("appid={}", GOOD_KEY)) {
                    (
                        "401 Unauthorized",
                        r#"{"cod":401,"message":"Invalid API key."}"#,
                    )
                } else if !request_line.contains("units=metric") {
                    ("400 Bad Request", r#"{"cod":"400","message":"units"}"#)
                } else if request_line.contains("q=Lisbon") {
                    ("200 OK", r#"{"main":{"temp":5.5,"humidity":80}}"#)
                } else if request_line.contains("q=Reykjavik") {
                    ("200 OK", r#"{"main":{"temp":-3.25}}"#)
                } else if request_line.contains("q=Garbled") {
                    ("200 OK", r#"{"main":{}}"#)
                } else {
                    ("404 Not Found", r#"{"cod":"404","message":"city not found"}"#)
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{}/data/2.5/weather", addr)
}
