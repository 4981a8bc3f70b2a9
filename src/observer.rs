//! Diagnostics seam for the ingestion pipeline.
//!
//! The pipeline absorbs per-feed, per-item and per-image failures. Instead of
//! logging them itself it reports them here, and the caller decides what to
//! do with them.

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::ingest::IngestReport;
use crate::{TARGET_INGEST, TARGET_MEDIA, TARGET_WEB_REQUEST};

#[allow(unused_variables)]
pub trait IngestObserver: Send + Sync {
    fn feed_read(&self, url: &str, items: usize) {}

    fn feed_failed(&self, url: &str, error: &Error) {}

    fn batch_finished(&self, category: &str, report: &IngestReport) {}

    /// The item's identity is already stored; nothing was done.
    fn item_skipped(&self, hash_id: &str) {}

    fn item_committed(&self, hash_id: &str, id: i64) {}

    /// Another writer stored the identity between the check and the insert.
    fn item_conflict(&self, hash_id: &str) {}

    /// The full article could not be grabbed; the feed's own content is kept.
    fn content_grab_failed(&self, hash_id: &str, url: &str, error: &Error) {}

    fn image_localized(&self, hash_id: &str, remote: &str, local: &str) {}

    fn image_failed(&self, hash_id: &str, remote: &str, error: &Error) {}

    fn image_excluded(&self, hash_id: &str, remote: &str) {}
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IngestObserver for NoopObserver {}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn feed_read(&self, url: &str, items: usize) {
        debug!(target: TARGET_WEB_REQUEST, "Parsed feed {} with {} entries", url, items);
    }

    fn feed_failed(&self, url: &str, error: &Error) {
        warn!(target: TARGET_WEB_REQUEST, "Skipping feed {}: {}", url, error);
    }

    fn batch_finished(&self, category: &str, report: &IngestReport) {
        if report.committed > 0 {
            info!(
                target: TARGET_INGEST,
                "[{}] {} new posts, {} already stored, {} images localized, {} images failed",
                category,
                report.committed,
                report.skipped + report.conflicts,
                report.images_localized,
                report.images_failed
            );
        } else {
            debug!(target: TARGET_INGEST, "[{}] No new posts", category);
        }
    }

    fn item_skipped(&self, hash_id: &str) {
        debug!(target: TARGET_INGEST, "Already stored: {}", hash_id);
    }

    fn item_committed(&self, hash_id: &str, id: i64) {
        debug!(target: TARGET_INGEST, "Stored {} as post {}", hash_id, id);
    }

    fn item_conflict(&self, hash_id: &str) {
        debug!(target: TARGET_INGEST, "Lost insert race for {}, treating as stored", hash_id);
    }

    fn content_grab_failed(&self, hash_id: &str, url: &str, error: &Error) {
        warn!(target: TARGET_WEB_REQUEST, "{}: keeping feed content, grab of {} failed: {}", hash_id, url, error);
    }

    fn image_localized(&self, hash_id: &str, remote: &str, local: &str) {
        debug!(target: TARGET_MEDIA, "{}: {} -> {}", hash_id, remote, local);
    }

    fn image_failed(&self, hash_id: &str, remote: &str, error: &Error) {
        warn!(target: TARGET_MEDIA, "{}: keeping remote image {}: {}", hash_id, remote, error);
    }

    fn image_excluded(&self, hash_id: &str, remote: &str) {
        debug!(target: TARGET_MEDIA, "{}: excluded image {}", hash_id, remote);
    }
}
