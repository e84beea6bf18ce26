use thiserror::Error;

/// Network ingestion failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },
    #[error("range request for {url} answered with {status} instead of 206")]
    RangeNotSatisfied { status: u16, url: String },
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("failed to build HTTP client: {0}")]
    Build(String),
    #[error("ingestion cancelled")]
    Cancelled,
}

impl NetError {
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    pub fn http_status(status: u16, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Informational only; nothing in tapedeck retries on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::RangeNotSatisfied { .. }
            | Self::InvalidRange(_)
            | Self::Build(_)
            | Self::Cancelled => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::RangeNotSatisfied { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

pub type NetResult<T> = Result<T, NetError>;
