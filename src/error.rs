/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Parse failed for {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("Post already stored: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Parse {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that must stop the whole run instead of a single feed, item or image.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::DeadlineExceeded(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Conflict(db_err.message().to_string())
            }
            _ => Error::StorageUnavailable(err),
        }
    }
}
