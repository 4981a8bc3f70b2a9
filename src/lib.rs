//! Offline mirror for RSS/Atom feeds.
//!
//! Feeds are read, each new item has its remote images copied into a local
//! media directory, the item content is rewritten to point at the local
//! copies, and the result is stored once per item identity in SQLite.

pub mod config;
pub mod db;
pub mod environment;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod logging;
pub mod media;
pub mod observer;
pub mod rss;

pub use config::{Config, ConfigBuilder, FeedMap};
pub use error::{Error, Result};
pub use ingest::{IngestReport, Ingestor, RunReport};

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_DB: &str = "db_query";
pub const TARGET_MEDIA: &str = "media";
pub const TARGET_INGEST: &str = "ingest";
