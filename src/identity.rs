//! Item identity and the "have we stored this already" check.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::db::PostStore;
use crate::error::Result;

/// Derives the stable `hash_id` of an item from its feed-native identity.
///
/// The first non-blank candidate wins, so callers pass the feed id first and
/// progressively weaker fallbacks (link, title plus date) after it. Identity
/// is global: the same entry seen through two feeds hashes the same.
pub fn derive_hash_id<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let token = candidates.into_iter().map(str::trim).find(|c| !c.is_empty())?;

    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    Some(format!("{:x}", hasher.finalize()))
}

/// Point lookup of item identities against the post store.
///
/// A negative answer is only advisory: two concurrent batches can both see an
/// identity as new, and the store's unique constraint decides which commit wins.
#[derive(Clone)]
pub struct DedupIndex {
    store: Arc<dyn PostStore>,
}

impl DedupIndex {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self { store }
    }

    pub async fn is_known(&self, hash_id: &str) -> Result<bool> {
        Ok(self.store.find_by_hash_id(hash_id).await?.is_some())
    }
}
