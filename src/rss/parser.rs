//! Feed parsing for RSS, Atom and JSON Feed documents.

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use std::io::Cursor;
use tracing::{debug, warn};

use super::types::{Feed, FeedItem, Resource};
use super::util::{cleanup_xml, decode_body};
use crate::error::{Error, Result};
use crate::identity::derive_hash_id;
use crate::TARGET_WEB_REQUEST;

/// Parses a downloaded feed into items in document order.
///
/// A document that fails to parse is cleaned up and parsed once more; entries
/// without any usable identity are dropped.
pub fn parse_feed(resource: &Resource) -> Result<Feed> {
    let fetched_at = Utc::now();

    let feed = match parser::parse(Cursor::new(&resource.content)) {
        Ok(feed) => feed,
        Err(first_err) => {
            let body = decode_body(&resource.content, resource.encoding.as_deref());
            let cleaned_xml = cleanup_xml(&body);

            if !(cleaned_xml.contains("<rss") || cleaned_xml.contains("<feed") || cleaned_xml.contains("<rdf")) {
                let preview = if body.chars().all(|c| c.is_ascii_graphic() || c.is_whitespace()) {
                    body.chars().take(100).collect::<String>()
                } else {
                    "[binary data]".to_string()
                };
                return Err(Error::parse(
                    &resource.url,
                    format!("{}. Content preview: {}", first_err, preview),
                ));
            }

            match parser::parse(Cursor::new(cleaned_xml.into_bytes())) {
                Ok(feed) => {
                    debug!(target: TARGET_WEB_REQUEST, "Feed {} parsed after XML cleanup", resource.url);
                    feed
                }
                Err(second_err) => {
                    return Err(Error::parse(
                        &resource.url,
                        format!(
                            "failed even after cleanup. First error: {}. Second error: {}",
                            first_err, second_err
                        ),
                    ));
                }
            }
        }
    };

    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        match map_entry(entry, fetched_at) {
            Some(item) => items.push(item),
            None => warn!(target: TARGET_WEB_REQUEST, "Dropping entry without identity in {}", resource.url),
        }
    }

    Ok(Feed {
        title: feed.title.map(|t| t.content),
        items,
    })
}

fn map_entry(entry: Entry, fetched_at: DateTime<Utc>) -> Option<FeedItem> {
    let title = entry.title.map(|t| t.content.trim().to_string()).unwrap_or_default();
    let url = article_link(&entry.links).unwrap_or_default();
    let date = entry.published.or(entry.updated);

    let dated_title = match date {
        Some(date) if !title.is_empty() => format!("{}{}", title, date.to_rfc3339()),
        _ => String::new(),
    };
    let hash_id = derive_hash_id([entry.id.as_str(), url.as_str(), dated_title.as_str()])?;

    let author = entry
        .authors
        .iter()
        .map(|p| p.name.trim())
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let content = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .unwrap_or_default();

    let enclosure = entry
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("enclosure"))
        .map(|link| (link.href.clone(), link.media_type.clone()))
        .or_else(|| {
            entry
                .media
                .iter()
                .flat_map(|media| media.content.iter())
                .find_map(|mc| {
                    mc.url
                        .as_ref()
                        .map(|u| (u.to_string(), mc.content_type.as_ref().map(|m| m.to_string())))
                })
        });
    let (enclosure_url, enclosure_type) = match enclosure {
        Some((url, media_type)) => (Some(url), media_type),
        None => (None, None),
    };

    Some(FeedItem {
        hash_id,
        title,
        author,
        url,
        published: date.unwrap_or(fetched_at),
        content,
        enclosure_url,
        enclosure_type,
    })
}

/// The entry's article link: the first alternate link, else the first link
/// that is not an enclosure.
fn article_link(links: &[feed_rs::model::Link]) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel.as_deref() == Some("alternate"))
        .or_else(|| links.iter().find(|link| link.rel.as_deref() != Some("enclosure")))
        .map(|link| link.href.trim().to_string())
}
