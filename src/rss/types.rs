//! Type definitions for the feed reader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// A downloaded feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Final URL after redirects.
    pub url: String,
    pub content: Vec<u8>,
    /// Charset announced by the server, if any.
    pub encoding: Option<String>,
}

/// A parsed feed: its title and its entries in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
}

/// One syndicated entry as received from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub hash_id: String,
    pub title: String,
    pub author: String,
    /// Link to the original article.
    pub url: String,
    pub published: DateTime<Utc>,
    pub content: String,
    pub enclosure_url: Option<String>,
    pub enclosure_type: Option<String>,
}

impl FeedItem {
    pub fn published_timestamp(&self) -> i64 {
        self.published.timestamp()
    }
}

// Constants
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
pub const FEED_ACCEPT: &str = "application/feed+json, application/json, application/rss+xml, application/atom+xml, application/xml, text/xml, */*;q=0.9";
