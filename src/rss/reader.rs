//! Downloading and parsing feeds.

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::client::{create_http_client, fetch_resource};
use super::parser::parse_feed;
use super::types::{Feed, Resource, FEED_ACCEPT, RETRY_DELAY};
use super::util::is_valid_url;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::TARGET_WEB_REQUEST;

/// Produces feed items for the ingestion pipeline.
#[async_trait]
pub trait FeedReader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Resource>;

    fn parse(&self, resource: &Resource) -> Result<Feed>;

    async fn read(&self, url: &str) -> Result<Feed> {
        let resource = self.download(url).await?;
        self.parse(&resource)
    }
}

/// Fetches feeds over HTTP, retrying failed downloads with a fixed delay.
#[derive(Clone, Debug)]
pub struct HttpFeedReader {
    client: reqwest::Client,
    timeout: Duration,
    retries: usize,
    retry_delay: Duration,
}

impl HttpFeedReader {
    pub fn new(config: &Config) -> Result<Self> {
        let client = create_http_client(&config.user_agent)?;
        Ok(Self::with_client(client, config.fetch_timeout, config.feed_retries))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration, retries: usize) -> Self {
        Self {
            client,
            timeout,
            retries,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[async_trait]
impl FeedReader for HttpFeedReader {
    async fn download(&self, url: &str) -> Result<Resource> {
        if !is_valid_url(url) {
            return Err(Error::fetch(url, "not a valid http(s) URL"));
        }

        let mut attempts = 0;
        loop {
            debug!(target: TARGET_WEB_REQUEST, "Loading feed from {}", url);
            match fetch_resource(&self.client, url, FEED_ACCEPT, self.timeout).await {
                Ok(resource) => return Ok(resource),
                Err(err) if attempts < self.retries => {
                    attempts += 1;
                    warn!(
                        target: TARGET_WEB_REQUEST,
                        "Attempt {}/{} for {} failed: {}",
                        attempts,
                        self.retries + 1,
                        url,
                        err
                    );
                    sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn parse(&self, resource: &Resource) -> Result<Feed> {
        parse_feed(resource)
    }
}
