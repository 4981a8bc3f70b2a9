use async_trait::async_trait;
use reqwest::header;
use tokio::time::{timeout, Duration};
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::rss::create_http_client;
use crate::TARGET_MEDIA;

/// Downloads the raw bytes behind an image URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// reqwest-backed fetcher with a hard per-request deadline. No retries.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = create_http_client(&config.user_agent)?;
        Ok(Self::with_client(client, config.fetch_timeout))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        debug!(target: TARGET_MEDIA, "Fetching image {}", url);

        let request = async {
            let response = self
                .client
                .get(url.clone())
                .header(header::ACCEPT, "image/avif,image/webp,image/*,*/*;q=0.8")
                .send()
                .await
                .map_err(|e| Error::fetch(url.as_str(), e))?;

            if !response.status().is_success() {
                return Err(Error::fetch(
                    url.as_str(),
                    format!("HTTP status {}", response.status()),
                ));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::fetch(url.as_str(), e))?;
            Ok(bytes.to_vec())
        };

        match timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(Error::fetch(
                url.as_str(),
                format!("timed out after {} seconds", self.timeout.as_secs_f32()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts one connection, reads the request head and answers with `response`.
    /// `None` keeps the socket open without ever answering.
    async fn serve_once(response: Option<&'static str>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            match response {
                Some(response) => {
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
                None => tokio::time::sleep(Duration::from_secs(30)).await,
            }
        });
        Url::parse(&format!("http://{}/image.png", addr)).unwrap()
    }

    fn fetcher(timeout: Duration) -> HttpFetcher {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpFetcher::with_client(client, timeout)
    }

    #[tokio::test]
    async fn test_silent_host_times_out() {
        let url = serve_once(None).await;
        let started = Instant::now();

        let err = fetcher(Duration::from_millis(300)).fetch(&url).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { ref reason, .. } if reason.contains("timed out")), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let url = serve_once(Some("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")).await;

        let err = fetcher(Duration::from_secs(5)).fetch(&url).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { ref reason, .. } if reason.contains("404")), "{:?}", err);
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_success_returns_body_bytes() {
        let url = serve_once(Some(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 4\r\nConnection: close\r\n\r\nPNG!",
        ))
        .await;

        let bytes = fetcher(Duration::from_secs(5)).fetch(&url).await.unwrap();
        assert_eq!(bytes, b"PNG!");
    }
}
