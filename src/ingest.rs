//! Ingestion orchestration: dedup, grab, rewrite, commit.
//!
//! [`Ingestor::ingest`] is the single writer to the post store. Per-item and
//! per-image failures are absorbed and reported to the observer; only storage
//! failures (and an exceeded run deadline) reach the caller.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Config, FeedMap};
use crate::db::{NewPost, PostStore};
use crate::error::{Error, Result};
use crate::identity::DedupIndex;
use crate::media::{ContentRewriter, HttpFetcher, ImageFetcher, ImageLocalizer, ImageRef};
use crate::observer::{IngestObserver, TracingObserver};
use crate::rss::{ContentGrabber, FeedItem, FeedReader, HttpContentGrabber, HttpFeedReader};
use crate::{TARGET_INGEST, TARGET_MEDIA};

/// Outcome counts of one `ingest` call, or of a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub committed: usize,
    /// Items whose identity was already stored before processing.
    pub skipped: usize,
    /// Items that lost the commit race to a concurrent writer.
    pub conflicts: usize,
    pub images_localized: usize,
    pub images_failed: usize,
    pub images_excluded: usize,
}

impl IngestReport {
    pub fn absorb(&mut self, other: &IngestReport) {
        self.committed += other.committed;
        self.skipped += other.skipped;
        self.conflicts += other.conflicts;
        self.images_localized += other.images_localized;
        self.images_failed += other.images_failed;
        self.images_excluded += other.images_excluded;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub totals: IngestReport,
}

enum ItemOutcome {
    Skipped,
    Conflict,
    Committed {
        localized: usize,
        failed: usize,
        excluded: usize,
    },
}

pub struct Ingestor {
    store: Arc<dyn PostStore>,
    dedup: DedupIndex,
    localizer: Arc<ImageLocalizer>,
    rewriter: ContentRewriter,
    observer: Arc<dyn IngestObserver>,
    grabber: Option<Arc<dyn ContentGrabber>>,
    reader: Option<Arc<dyn FeedReader>>,
    item_concurrency: usize,
    feed_concurrency: usize,
    run_deadline: Option<std::time::Duration>,
}

impl Ingestor {
    /// Builds an ingestor without a feed reader or grabber; attach them with
    /// [`Ingestor::with_reader`] and [`Ingestor::with_grabber`].
    pub fn new(
        config: &Config,
        store: Arc<dyn PostStore>,
        fetcher: Arc<dyn ImageFetcher>,
        observer: Arc<dyn IngestObserver>,
    ) -> Self {
        let localizer = Arc::new(ImageLocalizer::new(config, fetcher));
        let rewriter = ContentRewriter::new(localizer.clone(), observer.clone(), config.image_concurrency);
        Self {
            dedup: DedupIndex::new(store.clone()),
            store,
            localizer,
            rewriter,
            observer,
            grabber: None,
            reader: None,
            item_concurrency: config.item_concurrency.max(1),
            feed_concurrency: config.feed_concurrency.max(1),
            run_deadline: config.run_deadline,
        }
    }

    /// Wires the HTTP reader, image fetcher and (if enabled) content grabber,
    /// reporting through `tracing`.
    pub fn from_config(config: &Config, store: Arc<dyn PostStore>) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config)?);
        let reader = Arc::new(HttpFeedReader::new(config)?);
        let mut ingestor = Self::new(config, store, fetcher, Arc::new(TracingObserver)).with_reader(reader);
        if config.content_grabber {
            ingestor = ingestor.with_grabber(Arc::new(HttpContentGrabber::new(config)?));
        }
        Ok(ingestor)
    }

    pub fn with_reader(mut self, reader: Arc<dyn FeedReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_grabber(mut self, grabber: Arc<dyn ContentGrabber>) -> Self {
        self.grabber = Some(grabber);
        self
    }

    /// Stores every item of one batch whose identity is not yet known.
    ///
    /// Items are processed newest first; equal timestamps keep their feed
    /// order.
    pub async fn ingest(&self, mut items: Vec<FeedItem>, category: &str) -> Result<IngestReport> {
        self.store.ensure_schema().await?;
        items.sort_by(|a, b| b.published.cmp(&a.published));

        let mut report = IngestReport::default();
        let mut outcomes = stream::iter(items)
            .map(|item| self.ingest_item(item, category))
            .buffered(self.item_concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome? {
                ItemOutcome::Skipped => report.skipped += 1,
                ItemOutcome::Conflict => report.conflicts += 1,
                ItemOutcome::Committed {
                    localized,
                    failed,
                    excluded,
                } => {
                    report.committed += 1;
                    report.images_localized += localized;
                    report.images_failed += failed;
                    report.images_excluded += excluded;
                }
            }
        }

        self.observer.batch_finished(category, &report);
        Ok(report)
    }

    async fn ingest_item(&self, item: FeedItem, category: &str) -> Result<ItemOutcome> {
        if self.dedup.is_known(&item.hash_id).await? {
            self.observer.item_skipped(&item.hash_id);
            return Ok(ItemOutcome::Skipped);
        }

        let published = item.published_timestamp();
        let mut content = item.content;
        if let Some(grabber) = &self.grabber {
            if !item.url.is_empty() {
                match grabber.grab(&item.url).await {
                    Ok(article) => content = article,
                    Err(err) => self.observer.content_grab_failed(&item.hash_id, &item.url, &err),
                }
            }
        }

        let base = Url::parse(&item.url).ok();
        let rewritten = self.rewriter.rewrite(&content, &item.hash_id, base.as_ref()).await;

        let post = NewPost {
            hash_id: item.hash_id,
            title: item.title,
            source: item.url,
            author: item.author,
            category: category.to_string(),
            content: rewritten.content,
            published,
            enclosure_url: item.enclosure_url,
            enclosure_type: item.enclosure_type,
        };

        match self.store.insert(&post).await {
            Ok(id) => {
                self.observer.item_committed(&post.hash_id, id);
                Ok(ItemOutcome::Committed {
                    localized: rewritten.images.len(),
                    failed: rewritten.failed,
                    excluded: rewritten.excluded,
                })
            }
            Err(Error::Conflict(_)) => {
                discard_images(&rewritten.images).await;
                self.observer.item_conflict(&post.hash_id);
                Ok(ItemOutcome::Conflict)
            }
            Err(err) => {
                discard_images(&rewritten.images).await;
                Err(err)
            }
        }
    }

    /// Reads and ingests every feed of `feeds`.
    ///
    /// A feed that cannot be downloaded or parsed is counted as failed and
    /// the others carry on. Storage failures abort the run, as does the
    /// configured run deadline.
    pub async fn run(&self, feeds: &FeedMap) -> Result<RunReport> {
        let reader = self
            .reader
            .clone()
            .ok_or_else(|| Error::Config("no feed reader configured".to_string()))?;

        match self.localizer.sweep_partials().await {
            Ok(0) => {}
            Ok(n) => debug!(target: TARGET_MEDIA, "Removed {} partial image files", n),
            Err(err) => warn!(target: TARGET_MEDIA, "Cannot sweep partial image files: {}", err),
        }

        info!(target: TARGET_INGEST, "Syncing {} feeds", feeds.len());
        let work = self.run_feeds(reader.as_ref(), feeds);
        let report = match self.run_deadline {
            Some(deadline) => timeout(deadline, work)
                .await
                .map_err(|_| Error::DeadlineExceeded(deadline))??,
            None => work.await?,
        };

        info!(
            target: TARGET_INGEST,
            "Sync finished: {} feeds ok, {} failed, {} new posts",
            report.feeds_ok,
            report.feeds_failed,
            report.totals.committed
        );
        Ok(report)
    }

    async fn run_feeds(&self, reader: &dyn FeedReader, feeds: &FeedMap) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut results = stream::iter(feeds.iter())
            .map(|(url, category)| self.run_feed(reader, url, category))
            .buffer_unordered(self.feed_concurrency);

        while let Some(result) = results.next().await {
            match result? {
                Some(batch) => {
                    report.feeds_ok += 1;
                    report.totals.absorb(&batch);
                }
                None => report.feeds_failed += 1,
            }
        }
        Ok(report)
    }

    /// `Ok(None)` when the feed itself could not be read.
    async fn run_feed(&self, reader: &dyn FeedReader, url: &str, category: &str) -> Result<Option<IngestReport>> {
        debug!(target: TARGET_INGEST, "Reading {} for [{}]", url, category);
        let feed = match reader.read(url).await {
            Ok(feed) => feed,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                self.observer.feed_failed(url, &err);
                return Ok(None);
            }
        };

        self.observer.feed_read(url, feed.items.len());
        self.ingest(feed.items, category).await.map(Some)
    }
}

/// Removes the files of an item that was not committed; no post references them.
async fn discard_images(images: &[ImageRef]) {
    for image in images {
        if let Err(err) = tokio::fs::remove_file(&image.path).await {
            warn!(target: TARGET_MEDIA, "Cannot remove {}: {}", image.path.display(), err);
        }
    }
}
