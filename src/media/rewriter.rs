use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use super::localizer::{resolve_image_url, ImageLocalizer};
use crate::observer::IngestObserver;

static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

/// A remote image reference and the local copy that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub remote: String,
    pub local: String,
    /// The file written for this image.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewrittenContent {
    pub content: String,
    /// Successful localizations, in discovery order.
    pub images: Vec<ImageRef>,
    pub failed: usize,
    pub excluded: usize,
}

/// Localizes every image of an item and rewrites its HTML to match.
pub struct ContentRewriter {
    localizer: Arc<ImageLocalizer>,
    observer: Arc<dyn IngestObserver>,
    concurrency: usize,
}

impl ContentRewriter {
    pub fn new(
        localizer: Arc<ImageLocalizer>,
        observer: Arc<dyn IngestObserver>,
        concurrency: usize,
    ) -> Self {
        Self {
            localizer,
            observer,
            concurrency: concurrency.max(1),
        }
    }

    /// Never fails: images that cannot be localized keep their remote URL.
    pub async fn rewrite(&self, html: &str, hash_id: &str, base: Option<&Url>) -> RewrittenContent {
        let mut seen = HashSet::new();
        let mut excluded = 0;
        let mut candidates = Vec::new();
        for src in discover_image_sources(html) {
            if !seen.insert(src.clone()) {
                continue;
            }
            let resolved = resolve_image_url(&src, base);
            if self.localizer.is_excluded(&src)
                || resolved.is_some_and(|url| self.localizer.is_excluded(url.as_str()))
            {
                self.observer.image_excluded(hash_id, &src);
                excluded += 1;
                continue;
            }
            candidates.push(src);
        }

        let outcomes: Vec<_> = stream::iter(candidates)
            .map(|src| async move {
                let outcome = self.localizer.localize(&src, hash_id, base).await;
                (src, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut images = Vec::new();
        let mut failed = 0;
        for (remote, outcome) in outcomes {
            match outcome {
                Ok(local) => {
                    self.observer.image_localized(hash_id, &remote, &local.reference);
                    images.push(ImageRef {
                        remote,
                        local: local.reference,
                        path: local.path,
                    });
                }
                Err(err) => {
                    self.observer.image_failed(hash_id, &remote, &err);
                    failed += 1;
                }
            }
        }

        RewrittenContent {
            content: apply_image_refs(html, &images),
            images,
            failed,
            excluded,
        }
    }
}

/// `src` values of every `<img>` in document order, duplicates included.
///
/// Parsing is lenient; broken markup yields whatever images html5ever recovers.
pub fn discover_image_sources(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&IMG_SELECTOR)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(str::to_string)
        .collect()
}

/// Replaces every literal occurrence of each remote URL with its local
/// reference, in order, across the whole content string.
///
/// Attribute values come out of the parser entity-decoded, so the
/// `&amp;`-escaped spelling of a URL is replaced as well.
pub fn apply_image_refs(content: &str, images: &[ImageRef]) -> String {
    let mut content = content.to_string();
    for image in images {
        content = content.replace(&image.remote, &image.local);
        if image.remote.contains('&') {
            let escaped = image.remote.replace('&', "&amp;");
            content = content.replace(&escaped, &image.local);
        }
    }
    content
}
