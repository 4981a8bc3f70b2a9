//! Full-article grabbing for feeds that only ship excerpts.
//!
//! Site rules live in `{rules_dir}/{host}.json` as
//! `{"body": ["css selector", ...], "strip": ["css selector", ...]}`.
//! Pages without rules go through readability extraction.

use async_trait::async_trait;
use readability::extractor;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::debug;
use url::Url;

use super::client::{create_http_client, fetch_resource};
use super::util::decode_body;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::TARGET_WEB_REQUEST;

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Replaces an item's excerpt with the article behind its link.
#[async_trait]
pub trait ContentGrabber: Send + Sync {
    /// Returns the article body HTML found at `article_url`.
    async fn grab(&self, article_url: &str) -> Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GrabberRules {
    #[serde(default)]
    pub body: Vec<String>,
    #[serde(default)]
    pub strip: Vec<String>,
}

impl GrabberRules {
    /// Loads the rules for `host` from `rules_dir`, if a file exists.
    pub async fn load(rules_dir: &Path, host: &str) -> Result<Option<Self>> {
        let host = host.trim_start_matches("www.");
        let path = rules_dir.join(format!("{}.json", host));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let rules = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid grabber rules {}: {}", path.display(), e)))?;
        Ok(Some(rules))
    }

    /// Concatenates the outer HTML of every `body` match after removing
    /// `strip` matches from the document.
    pub fn apply(&self, html: &str) -> Result<String> {
        let mut document = Html::parse_document(html);

        for pattern in &self.strip {
            let selector = parse_selector(pattern)?;
            let ids: Vec<_> = document.select(&selector).map(|el| el.id()).collect();
            for id in ids {
                if let Some(mut node) = document.tree.get_mut(id) {
                    node.detach();
                }
            }
        }

        let mut body = String::new();
        for pattern in &self.body {
            let selector = parse_selector(pattern)?;
            for element in document.select(&selector) {
                body.push_str(&element.html());
            }
        }
        Ok(body)
    }
}

fn parse_selector(pattern: &str) -> Result<Selector> {
    Selector::parse(pattern)
        .map_err(|e| Error::Config(format!("invalid grabber selector {:?}: {}", pattern, e)))
}

/// Readability extraction of the main article body.
pub fn extract_article(html: &str, url: &Url) -> Result<String> {
    let mut reader = Cursor::new(html.as_bytes());
    let product = extractor::extract(&mut reader, url).map_err(|e| Error::parse(url.as_str(), e))?;
    Ok(product.content)
}

/// Fetches article pages with the shared client and applies site rules.
#[derive(Clone, Debug)]
pub struct HttpContentGrabber {
    client: reqwest::Client,
    timeout: Duration,
    rules_dir: Option<PathBuf>,
}

impl HttpContentGrabber {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: create_http_client(&config.user_agent)?,
            timeout: config.fetch_timeout,
            rules_dir: config.rules_dir.clone(),
        })
    }
}

#[async_trait]
impl ContentGrabber for HttpContentGrabber {
    async fn grab(&self, article_url: &str) -> Result<String> {
        let url = Url::parse(article_url).map_err(|e| Error::fetch(article_url, e))?;
        let resource = fetch_resource(&self.client, url.as_str(), PAGE_ACCEPT, self.timeout).await?;
        let html = decode_body(&resource.content, resource.encoding.as_deref());

        let rules = match (&self.rules_dir, url.host_str()) {
            (Some(dir), Some(host)) => GrabberRules::load(dir, host).await?,
            _ => None,
        };

        let content = match rules {
            Some(rules) => {
                debug!(target: TARGET_WEB_REQUEST, "Applying grabber rules for {}", article_url);
                rules.apply(&html)?
            }
            None => extract_article(&html, &url)?,
        };

        if content.trim().is_empty() {
            return Err(Error::parse(article_url, "no article content found"));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAGE: &str = r#"<html><body>
        <nav>Menu</nav>
        <article class="post"><h1>Title</h1><p>Body <img src="/a.png"></p><div class="share">Share me</div></article>
        <footer>Footer</footer>
    </body></html>"#;

    #[test]
    fn test_rules_select_body_and_strip_noise() {
        let rules = GrabberRules {
            body: vec!["article.post".to_string()],
            strip: vec![".share".to_string()],
        };
        let content = rules.apply(PAGE).unwrap();
        assert!(content.starts_with("<article class=\"post\">"));
        assert!(content.contains("<img src=\"/a.png\">"));
        assert!(!content.contains("Share me"));
        assert!(!content.contains("Menu"));
        assert!(!content.contains("Footer"));
    }

    #[test]
    fn test_rules_without_match_yield_empty_body() {
        let rules = GrabberRules {
            body: vec!["#missing".to_string()],
            strip: vec![],
        };
        assert_eq!(rules.apply(PAGE).unwrap(), "");
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let rules = GrabberRules {
            body: vec!["<<<".to_string()],
            strip: vec![],
        };
        assert!(matches!(rules.apply(PAGE), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_load_rules_ignores_www_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("blog.example.json"),
            r#"{"body": ["article"], "strip": ["nav"]}"#,
        )
        .unwrap();

        let rules = GrabberRules::load(dir.path(), "www.blog.example").await.unwrap().unwrap();
        assert_eq!(rules.body, vec!["article"]);
        assert_eq!(rules.strip, vec!["nav"]);

        assert!(GrabberRules::load(dir.path(), "other.example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_rules_rejects_bad_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blog.example.json"), "not json").unwrap();
        assert!(matches!(
            GrabberRules::load(dir.path(), "blog.example").await,
            Err(Error::Config(_))
        ));
    }
}
