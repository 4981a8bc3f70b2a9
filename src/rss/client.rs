//! HTTP client creation and request handling for feeds and article pages.

use reqwest::{cookie::Jar, header};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::types::Resource;
use super::util::charset_from_content_type;
use crate::error::{Error, Result};
use crate::TARGET_WEB_REQUEST;

/// Shared client for feeds, article pages and images.
pub fn create_http_client(user_agent: &str) -> Result<reqwest::Client> {
    let cookie_store = Jar::default();
    reqwest::Client::builder()
        .user_agent(user_agent)
        .cookie_store(true)
        .cookie_provider(Arc::new(cookie_store))
        .gzip(true)
        .redirect(reqwest::redirect::Policy::default())
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// GETs `url` within `limit` and returns the body with its announced charset.
pub async fn fetch_resource(
    client: &reqwest::Client,
    url: &str,
    accept: &str,
    limit: Duration,
) -> Result<Resource> {
    debug!(target: TARGET_WEB_REQUEST, "Requesting {}", url);

    let request = async {
        let response = client
            .get(url)
            .header(header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(Error::fetch(url, format!("HTTP status {}", response.status())));
        }

        let final_url = response.url().to_string();
        let encoding = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .and_then(charset_from_content_type);

        let bytes = response.bytes().await.map_err(|e| Error::fetch(url, e))?;
        debug!(target: TARGET_WEB_REQUEST, "Received {} bytes from {}", bytes.len(), final_url);

        Ok(Resource {
            url: final_url,
            content: bytes.to_vec(),
            encoding,
        })
    };

    match timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(Error::fetch(
            url,
            format!("timed out after {} seconds", limit.as_secs_f32()),
        )),
    }
}
