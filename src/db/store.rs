use async_trait::async_trait;

use super::types::{NewPost, Post, PostFilter, PostQuery};
use crate::error::Result;

/// Capability boundary for post storage.
///
/// The pipeline only ever talks to this trait, so the backing store is picked
/// by whoever constructs the [`Ingestor`](crate::Ingestor).
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Creates the posts table if it does not exist yet.
    async fn ensure_schema(&self) -> Result<()>;

    /// Commits a post and returns its store-assigned id. A post whose
    /// `hash_id` is already stored fails with `Error::Conflict`; the check
    /// happens inside the write, not before it.
    async fn insert(&self, post: &NewPost) -> Result<i64>;

    async fn query(&self, query: &PostQuery) -> Result<Vec<Post>>;

    async fn count(&self, filter: Option<&PostFilter>) -> Result<i64>;

    async fn find_by_hash_id(&self, hash_id: &str) -> Result<Option<Post>>;
}
