use std::fmt;

use trawler_core::{CatalogTag, JoinSummary, PairEvent, TaggedItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    /// The body was not valid JSON.
    Decode,
    Cancelled,
    Network,
    /// The HTTP client could not be configured.
    Client,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Decode => write!(f, "invalid json body"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Client => write!(f, "http client setup error"),
        }
    }
}

/// Failure of one catalog's crawl. Every variant names the catalog so a run
/// can report exactly which side failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrawlError {
    #[error("fetching {catalog} page {url} failed: {source}")]
    Fetch {
        catalog: CatalogTag,
        url: String,
        source: FetchError,
    },
    #[error("could not decode {catalog} page {url}: {message}")]
    Decode {
        catalog: CatalogTag,
        url: String,
        message: String,
    },
    #[error("invalid {catalog} url {url}: {message}")]
    InvalidUrl {
        catalog: CatalogTag,
        url: String,
        message: String,
    },
    #[error("fetch queue closed while crawling {catalog}")]
    QueueClosed { catalog: CatalogTag },
}

impl CrawlError {
    pub fn catalog(&self) -> CatalogTag {
        match self {
            CrawlError::Fetch { catalog, .. }
            | CrawlError::Decode { catalog, .. }
            | CrawlError::InvalidUrl { catalog, .. }
            | CrawlError::QueueClosed { catalog } => *catalog,
        }
    }
}

/// Message on the merged channel shared by both catalog producers.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    Item(TaggedItem),
    Completed { tag: CatalogTag, items: u64 },
    Failed(CrawlError),
}

/// What a crawl run hands to its sink.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    /// First arrival of an item in this run.
    Item(TaggedItem),
    Pair(PairEvent),
    CatalogFailed(CrawlError),
    Finished(JoinSummary),
}
