//! Image localization and content rewriting.

mod fetch;
mod localizer;
mod rewriter;

pub use self::fetch::{HttpFetcher, ImageFetcher};
pub use self::localizer::{resolve_image_url, ImageLocalizer, LocalRef};
pub use self::rewriter::{apply_image_refs, discover_image_sources, ContentRewriter, ImageRef, RewrittenContent};

#[cfg(test)]
pub(crate) use self::localizer::tests::StubFetcher;
