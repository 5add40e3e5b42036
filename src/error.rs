use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Unknown article: {0}")]
    UnknownArticle(String),

    #[error("Invalid rating {0}: must be between 1 and 5")]
    InvalidRating(u8),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of a call to one of the external services, classified by whether
/// retrying can help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Timeouts, rate limits, 5xx and network failures.
    #[error("transient: {0}")]
    Transient(String),

    /// Auth failures, malformed requests and content-policy rejections.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ServiceError::Transient(msg) | ServiceError::Permanent(msg) => msg,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = truncate_body(body);
        match status {
            408 => ServiceError::Transient(format!("request timeout: {}", body)),
            429 => ServiceError::Transient(format!("rate limited: {}", body)),
            // 529 is Anthropic's "overloaded"
            500..=599 => ServiceError::Transient(format!("server error {}: {}", status, body)),
            401 | 403 => ServiceError::Permanent(format!("unauthorized ({}): {}", status, body)),
            _ => ServiceError::Permanent(format!("request rejected ({}): {}", status, body)),
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            ServiceError::Transient(format!("network: {}", err))
        } else if err.is_decode() {
            ServiceError::Permanent(format!("malformed response: {}", err))
        } else {
            ServiceError::Transient(err.to_string())
        }
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(300) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
