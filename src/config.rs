//! Run configuration.
//!
//! A [`Config`] is built once, either from the environment or through
//! [`ConfigBuilder`], and handed to the components that need it. Nothing in
//! the crate reads configuration from process-wide state after that point.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::environment::{get_env_var, get_env_var_as_vec, get_env_var_bool, get_env_var_parsed};
use crate::error::{Error, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/48.0.2564.116 Safari/537.36";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_IMAGE_CONCURRENCY: usize = 4;
pub const DEFAULT_ITEM_CONCURRENCY: usize = 1;
pub const DEFAULT_FEED_CONCURRENCY: usize = 2;
pub const DEFAULT_FEED_RETRIES: usize = 2;
pub const DEFAULT_IMAGE_DENYLIST: &[&str] = &["mc.yandex.ru"];

#[derive(Debug, Clone)]
pub struct Config {
    pub database_dir: PathBuf,
    pub media_dir: PathBuf,
    pub media_url_prefix: Option<String>,
    pub rules_dir: Option<PathBuf>,
    pub user_agent: String,
    pub image_denylist: Vec<String>,
    pub fetch_timeout: Duration,
    pub image_concurrency: usize,
    pub item_concurrency: usize,
    pub feed_concurrency: usize,
    pub run_deadline: Option<Duration>,
    pub content_grabber: bool,
    pub feed_retries: usize,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Builds a configuration from `FEEDMIRROR_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::default();

        if let Some(dir) = get_env_var("FEEDMIRROR_DATABASE_DIR") {
            builder = builder.database_dir(dir);
        }
        if let Some(dir) = get_env_var("FEEDMIRROR_MEDIA_DIR") {
            builder = builder.media_dir(dir);
        }
        if let Some(prefix) = get_env_var("FEEDMIRROR_MEDIA_URL_PREFIX") {
            builder = builder.media_url_prefix(prefix);
        }
        if let Some(dir) = get_env_var("FEEDMIRROR_RULES_DIR") {
            builder = builder.rules_dir(dir);
        }
        if let Some(agent) = get_env_var("FEEDMIRROR_USER_AGENT") {
            builder = builder.user_agent(agent);
        }
        if get_env_var("FEEDMIRROR_IMAGE_DENYLIST").is_some() {
            builder = builder.image_denylist(get_env_var_as_vec("FEEDMIRROR_IMAGE_DENYLIST", ';'));
        }
        if let Some(secs) = get_env_var_parsed::<u64>("FEEDMIRROR_FETCH_TIMEOUT_SECS").map_err(Error::Config)? {
            builder = builder.fetch_timeout(Duration::from_secs(secs));
        }
        if let Some(n) = get_env_var_parsed::<usize>("FEEDMIRROR_IMAGE_CONCURRENCY").map_err(Error::Config)? {
            builder = builder.image_concurrency(n);
        }
        if let Some(n) = get_env_var_parsed::<usize>("FEEDMIRROR_ITEM_CONCURRENCY").map_err(Error::Config)? {
            builder = builder.item_concurrency(n);
        }
        if let Some(n) = get_env_var_parsed::<usize>("FEEDMIRROR_FEED_CONCURRENCY").map_err(Error::Config)? {
            builder = builder.feed_concurrency(n);
        }
        if let Some(secs) = get_env_var_parsed::<u64>("FEEDMIRROR_RUN_DEADLINE_SECS").map_err(Error::Config)? {
            builder = builder.run_deadline(Duration::from_secs(secs));
        }
        if let Some(enabled) = get_env_var_bool("FEEDMIRROR_CONTENT_GRABBER").map_err(Error::Config)? {
            builder = builder.content_grabber(enabled);
        }
        if let Some(n) = get_env_var_parsed::<usize>("FEEDMIRROR_FEED_RETRIES").map_err(Error::Config)? {
            builder = builder.feed_retries(n);
        }
        if let Some(dir) = get_env_var("FEEDMIRROR_LOG_DIR") {
            builder = builder.log_dir(dir);
        }

        builder.build()
    }
}

/// Consuming builder; `build()` validates and produces the immutable [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    database_dir: PathBuf,
    media_dir: PathBuf,
    media_url_prefix: Option<String>,
    rules_dir: Option<PathBuf>,
    user_agent: String,
    image_denylist: Vec<String>,
    fetch_timeout: Duration,
    image_concurrency: usize,
    item_concurrency: usize,
    feed_concurrency: usize,
    run_deadline: Option<Duration>,
    content_grabber: bool,
    feed_retries: usize,
    log_dir: PathBuf,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            database_dir: PathBuf::from("database"),
            media_dir: PathBuf::from("media"),
            media_url_prefix: None,
            rules_dir: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            image_denylist: DEFAULT_IMAGE_DENYLIST.iter().map(|s| s.to_string()).collect(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            image_concurrency: DEFAULT_IMAGE_CONCURRENCY,
            item_concurrency: DEFAULT_ITEM_CONCURRENCY,
            feed_concurrency: DEFAULT_FEED_CONCURRENCY,
            run_deadline: None,
            content_grabber: true,
            feed_retries: DEFAULT_FEED_RETRIES,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl ConfigBuilder {
    pub fn database_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.database_dir = dir.into();
        self
    }

    pub fn media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = dir.into();
        self
    }

    pub fn media_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.media_url_prefix = Some(prefix.into());
        self
    }

    pub fn rules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rules_dir = Some(dir.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn image_denylist(mut self, patterns: Vec<String>) -> Self {
        self.image_denylist = patterns;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.image_concurrency = n;
        self
    }

    pub fn item_concurrency(mut self, n: usize) -> Self {
        self.item_concurrency = n;
        self
    }

    pub fn feed_concurrency(mut self, n: usize) -> Self {
        self.feed_concurrency = n;
        self
    }

    pub fn run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    pub fn content_grabber(mut self, enabled: bool) -> Self {
        self.content_grabber = enabled;
        self
    }

    pub fn feed_retries(mut self, retries: usize) -> Self {
        self.feed_retries = retries;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        if self.image_concurrency == 0 || self.item_concurrency == 0 || self.feed_concurrency == 0 {
            return Err(Error::Config("concurrency limits must be at least 1".to_string()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(Error::Config("fetch timeout must be greater than zero".to_string()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(Error::Config("user agent must not be empty".to_string()));
        }

        let media_url_prefix = self
            .media_url_prefix
            .map(|p| p.trim_end_matches('/').to_string());

        Ok(Config {
            database_dir: self.database_dir,
            media_dir: self.media_dir,
            media_url_prefix,
            rules_dir: self.rules_dir,
            user_agent: self.user_agent,
            image_denylist: self.image_denylist,
            fetch_timeout: self.fetch_timeout,
            image_concurrency: self.image_concurrency,
            item_concurrency: self.item_concurrency,
            feed_concurrency: self.feed_concurrency,
            run_deadline: self.run_deadline,
            content_grabber: self.content_grabber,
            feed_retries: self.feed_retries,
            log_dir: self.log_dir,
        })
    }
}

/// Batch input: feed URL to category label, one `ingest` call per entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMap {
    feeds: Vec<(String, String)>,
}

impl FeedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feed, replacing the category if the URL is already present.
    pub fn insert(&mut self, url: impl Into<String>, category: impl Into<String>) {
        let url = url.into();
        let category = category.into();
        match self.feeds.iter_mut().find(|(u, _)| *u == url) {
            Some(entry) => entry.1 = category,
            None => self.feeds.push((url, category)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.feeds.iter().map(|(u, c)| (u.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Parses `url=category;url=category`. The category is split off at the
    /// last `=` so query strings in feed URLs survive.
    pub fn parse_pairs(raw: &str) -> Result<Self> {
        let mut map = FeedMap::new();
        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (url, category) = pair
                .rsplit_once('=')
                .ok_or_else(|| Error::Config(format!("feed entry without category: {}", pair)))?;
            let (url, category) = (url.trim(), category.trim());
            if url.is_empty() || category.is_empty() {
                return Err(Error::Config(format!("malformed feed entry: {}", pair)));
            }
            map.insert(url, category);
        }
        Ok(map)
    }

    /// Reads a JSON object of `{"feed url": "category"}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::Config(format!("feeds file is not valid JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::Config("feeds file must be a JSON object".to_string()))?;

        let mut map = FeedMap::new();
        for (url, category) in object {
            let category = category
                .as_str()
                .ok_or_else(|| Error::Config(format!("category for {} must be a string", url)))?;
            map.insert(url.as_str(), category);
        }
        Ok(map)
    }

    /// Reads `FEEDMIRROR_FEEDS_FILE` if set, otherwise `FEEDMIRROR_FEEDS`.
    pub fn from_env() -> Result<Self> {
        if let Some(path) = get_env_var("FEEDMIRROR_FEEDS_FILE") {
            return Self::from_json_file(Path::new(&path));
        }
        match get_env_var("FEEDMIRROR_FEEDS") {
            Some(raw) => Self::parse_pairs(&raw),
            None => Ok(FeedMap::new()),
        }
    }
}

impl<U: Into<String>, C: Into<String>> FromIterator<(U, C)> for FeedMap {
    fn from_iter<I: IntoIterator<Item = (U, C)>>(iter: I) -> Self {
        let mut map = FeedMap::new();
        for (url, category) in iter {
            map.insert(url, category);
        }
        map
    }
}
