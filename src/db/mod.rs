// Persistence gateway over the SQLite post store.
pub mod core;
mod post;
mod schema;
mod store;
mod types;

pub use self::core::{Database, DATABASE_FILE};
pub use self::store::PostStore;
pub use self::types::{FilterValue, NewPost, Post, PostField, PostFilter, PostQuery, SortOrder};
