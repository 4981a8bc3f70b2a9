use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use super::fetch::ImageFetcher;
use crate::config::Config;
use crate::error::{Error, Result};

static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("valid file name pattern"));

const MAX_EXTENSION_LEN: usize = 10;

/// Where a localized image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRef {
    pub path: PathBuf,
    /// What the rewritten content points at: the file path, or
    /// `{media_url_prefix}/{file name}` when a prefix is configured.
    pub reference: String,
}

/// Copies remote images into the media directory.
pub struct ImageLocalizer {
    fetcher: Arc<dyn ImageFetcher>,
    media_dir: PathBuf,
    media_url_prefix: Option<String>,
    denylist: Vec<String>,
}

impl ImageLocalizer {
    pub fn new(config: &Config, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            fetcher,
            media_dir: config.media_dir.clone(),
            media_url_prefix: config.media_url_prefix.clone(),
            denylist: config.image_denylist.clone(),
        }
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        self.denylist
            .iter()
            .any(|pattern| !pattern.is_empty() && url.contains(pattern.as_str()))
    }

    /// Fetches `remote` and stores it as `{hash_id}-{unique}.{ext}`.
    ///
    /// Writes exactly one file on success and nothing on failure. Relative
    /// sources are resolved against `base`, the item's own URL.
    pub async fn localize(&self, remote: &str, hash_id: &str, base: Option<&Url>) -> Result<LocalRef> {
        if self.is_excluded(remote) {
            return Err(Error::fetch(remote, "host is on the image denylist"));
        }
        let url = resolve_image_url(remote, base)
            .ok_or_else(|| Error::fetch(remote, "not a fetchable http(s) URL"))?;
        if self.is_excluded(url.as_str()) {
            return Err(Error::fetch(url.as_str(), "host is on the image denylist"));
        }

        let bytes = self.fetcher.fetch(&url).await?;
        if bytes.is_empty() {
            return Err(Error::fetch(remote, "empty response body"));
        }

        tokio::fs::create_dir_all(&self.media_dir).await?;
        let file_name = local_file_name(hash_id, &url);
        let path = self.media_dir.join(&file_name);
        write_atomically(&path, &bytes).await?;

        let reference = match &self.media_url_prefix {
            Some(prefix) => format!("{}/{}", prefix, file_name),
            None => path.to_string_lossy().into_owned(),
        };
        Ok(LocalRef { path, reference })
    }

    /// Removes `*.part` files left by writes that were cancelled mid-way.
    /// Returns how many were removed.
    pub async fn sweep_partials(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.media_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "part") {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Resolves an `<img src>` value to an absolute http(s) URL.
///
/// Returns `None` for `data:` URIs, other schemes, and relative sources when
/// there is no base to resolve them against.
pub fn resolve_image_url(src: &str, base: Option<&Url>) -> Option<Url> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }

    let url = match Url::parse(src) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(src).ok()?,
            None if src.starts_with("//") => Url::parse(&format!("https:{}", src)).ok()?,
            None => return None,
        },
        Err(_) => return None,
    };

    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn local_file_name(hash_id: &str, url: &Url) -> String {
    let stem = UNSAFE_FILE_CHARS.replace_all(hash_id, "_");
    let suffix = Uuid::new_v4().simple();
    match url_extension(url) {
        Some(ext) => format!("{}-{}.{}", stem, suffix, ext),
        None => format!("{}-{}", stem, suffix),
    }
}

/// Extension of the last path segment, if it looks like one.
fn url_extension(url: &Url) -> Option<&str> {
    let segment = url.path_segments()?.next_back()?;
    let (name, ext) = segment.rsplit_once('.')?;
    if name.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    ext.chars().all(|c| c.is_ascii_alphanumeric()).then_some(ext)
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    if let Err(e) = tokio::fs::write(&partial, bytes).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves canned bytes per URL; anything else is a fetch error.
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        pub(crate) responses: HashMap<String, Vec<u8>>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub(crate) fn serving(pairs: &[(&str, &str)]) -> Self {
            Self {
                responses: pairs
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(url.to_string());
            self.responses
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| Error::fetch(url.as_str(), "HTTP status 404 Not Found"))
        }
    }

    fn localizer(dir: &Path, fetcher: Arc<StubFetcher>) -> ImageLocalizer {
        let config = Config::builder().media_dir(dir).build().unwrap();
        ImageLocalizer::new(&config, fetcher)
    }

    fn files_in(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_localize_writes_one_file() {
        let dir = TempDir::new().unwrap();
        let media = dir.path().join("media");
        let fetcher = Arc::new(StubFetcher::serving(&[("http://x/a.png", "PNG")]));
        let localizer = localizer(&media, fetcher);

        let local = localizer.localize("http://x/a.png", "h", None).await.unwrap();
        let name = local.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("h-"));
        assert!(name.ends_with(".png"));
        assert_eq!(local.reference, local.path.to_string_lossy());
        assert_eq!(std::fs::read(&local.path).unwrap(), b"PNG");
        assert_eq!(files_in(&media), vec![name]);
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let media = dir.path().join("media");
        let localizer = localizer(&media, Arc::new(StubFetcher::default()));

        let err = localizer.localize("http://x/missing.png", "h", None).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(files_in(&media).is_empty());
    }

    #[tokio::test]
    async fn test_same_image_twice_gets_distinct_files() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::serving(&[("http://x/a.png", "PNG")]));
        let localizer = localizer(dir.path(), fetcher);

        let first = localizer.localize("http://x/a.png", "h", None).await.unwrap();
        let second = localizer.localize("http://x/a.png", "h", None).await.unwrap();
        assert_ne!(first.path, second.path);
        assert_eq!(files_in(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn test_missing_extension_and_prefix_reference() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::serving(&[("http://x/pixel?id=3", "GIF")]));
        let config = Config::builder()
            .media_dir(dir.path())
            .media_url_prefix("/media/")
            .build()
            .unwrap();
        let localizer = ImageLocalizer::new(&config, fetcher);

        let local = localizer.localize("http://x/pixel?id=3", "h/1", None).await.unwrap();
        let name = local.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("h_1-"));
        assert!(!name.contains('.'));
        assert_eq!(local.reference, format!("/media/{}", name));
    }

    #[tokio::test]
    async fn test_denylisted_url_is_never_fetched() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::serving(&[("https://mc.yandex.ru/watch/1", "GIF")]));
        let localizer = localizer(dir.path(), fetcher.clone());

        assert!(localizer.is_excluded("https://mc.yandex.ru/watch/1"));
        assert!(localizer.localize("https://mc.yandex.ru/watch/1", "h", None).await.is_err());
        assert!(fetcher.requested().is_empty());
        assert!(files_in(dir.path()).is_empty());
    }

    #[test]
    fn test_empty_denylist_entries_never_match() {
        let config = Config::builder()
            .image_denylist(vec![String::new()])
            .build()
            .unwrap();
        let localizer = ImageLocalizer::new(&config, Arc::new(StubFetcher::default()));
        assert!(!localizer.is_excluded("https://example.com/a.png"));
    }

    #[tokio::test]
    async fn test_relative_source_on_denylisted_host_is_never_fetched() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::serving(&[("https://mc.yandex.ru/watch/1", "GIF")]));
        let localizer = localizer(dir.path(), fetcher.clone());
        let base = Url::parse("https://mc.yandex.ru/post").unwrap();

        let err = localizer.localize("/watch/1", "h", Some(&base)).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(fetcher.requested().is_empty());
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_partial_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("h-1.png.part"), b"half").unwrap();
        std::fs::write(dir.path().join("h-2.part"), b"half").unwrap();
        std::fs::write(dir.path().join("h-3.png"), b"PNG").unwrap();
        let sweeper = localizer(dir.path(), Arc::new(StubFetcher::default()));

        assert_eq!(sweeper.sweep_partials().await.unwrap(), 2);
        assert_eq!(files_in(dir.path()), vec!["h-3.png".to_string()]);

        let missing = localizer(&dir.path().join("nope"), Arc::new(StubFetcher::default()));
        assert_eq!(missing.sweep_partials().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_relative_source_resolves_against_item_url() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(StubFetcher::serving(&[("https://blog.example/img/a.jpg", "JPG")]));
        let localizer = localizer(dir.path(), fetcher.clone());
        let base = Url::parse("https://blog.example/posts/1").unwrap();

        localizer.localize("/img/a.jpg", "h", Some(&base)).await.unwrap();
        assert_eq!(fetcher.requested(), vec!["https://blog.example/img/a.jpg"]);
    }

    #[test]
    fn test_resolve_image_url() {
        let base = Url::parse("https://blog.example/posts/1").unwrap();
        assert_eq!(
            resolve_image_url("a.png", Some(&base)).unwrap().as_str(),
            "https://blog.example/posts/a.png"
        );
        assert_eq!(
            resolve_image_url("//cdn.example/a.png", None).unwrap().as_str(),
            "https://cdn.example/a.png"
        );
        assert!(resolve_image_url("data:image/png;base64,AAAA", Some(&base)).is_none());
        assert!(resolve_image_url("ftp://x/a.png", None).is_none());
        assert!(resolve_image_url("a.png", None).is_none());
        assert!(resolve_image_url("   ", None).is_none());
    }

    #[test]
    fn test_url_extension() {
        let ext = |s: &str| url_extension(&Url::parse(s).unwrap()).map(str::to_string);
        assert_eq!(ext("http://x/a.png"), Some("png".to_string()));
        assert_eq!(ext("http://x/dir.v2/a"), None);
        assert_eq!(ext("http://x/"), None);
        assert_eq!(ext("http://x/.hidden"), None);
        assert_eq!(ext("http://x/a.png%20x"), None);
        assert_eq!(ext("http://x/a.tar.gz?v=1"), Some("gz".to_string()));
    }
}
