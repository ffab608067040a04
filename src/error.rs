//! Error types for each component seam.
//!
//! Page-level and issue-level failures are recorded where they happen; the
//! run-level and provider-level variants here are the ones that reach callers.

use thiserror::Error;

/// Failure to retrieve a single page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("could not resolve or connect to host: {0}")]
    Dns(String),

    #[error("client error (HTTP {0})")]
    Http4xx(u16),

    #[error("server error (HTTP {0})")]
    Http5xx(u16),

    #[error("response body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl FetchError {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Dns(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::from_status(status.as_u16()).unwrap_or(FetchError::Request(err.to_string()))
        } else {
            FetchError::Request(err.to_string())
        }
    }

    /// Maps an error status to its variant; `None` for non-error codes
    pub fn from_status(code: u16) -> Option<Self> {
        match code {
            400..=499 => Some(FetchError::Http4xx(code)),
            500..=599 => Some(FetchError::Http5xx(code)),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("seed URL {url} is unreachable: {source}")]
    SeedUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("invalid seed URL: {0}")]
    InvalidSeed(String),

    #[error("crawl exceeded the {0}s time limit")]
    TimedOut(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemediationError {
    #[error("issue not found: {0}")]
    IssueNotFound(String),

    #[error("issue {id} is not fixable: {reason}")]
    NotFixable { id: String, reason: String },

    #[error("issue {0} is still detected by the latest report")]
    StillDetected(String),

    #[error("report not found: version {0}")]
    ReportNotFound(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeywordError {
    #[error("keyword provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("at least one seed keyword is required")]
    NoSeeds,

    #[error("{url} does not rank for \"{keyword}\"")]
    NotRanked { keyword: String, url: String },

    #[error("invalid tracking target: {0}")]
    InvalidTarget(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("crawl run {0} is already in progress")]
    CrawlInProgress(u64),

    #[error("crawl run not found: {0}")]
    RunNotFound(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything an operation on the running service can fail with
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remediation(#[from] RemediationError),

    #[error(transparent)]
    Keyword(#[from] KeywordError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
