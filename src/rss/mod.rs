//! Feed reading for feedmirror.
//!
//! This module handles downloading, parsing and full-article grabbing for
//! RSS, Atom and JSON feeds. It hands typed items to the ingestion pipeline
//! and knows nothing about storage.

mod client;
mod grabber;
mod parser;
mod reader;
mod types;
mod util;

pub use self::client::{create_http_client, fetch_resource};
pub use self::grabber::{extract_article, ContentGrabber, GrabberRules, HttpContentGrabber};
pub use self::parser::parse_feed;
pub use self::reader::{FeedReader, HttpFeedReader};
pub use self::types::*;
pub use self::util::{charset_from_content_type, cleanup_xml, decode_body, is_valid_url};
