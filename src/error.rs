use std::time::Duration;

use thiserror::Error;

/// Failures inside one scraping strategy or one scraper
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("every strategy failed ({0})")]
    Exhausted(String),
}

impl ScrapeError {
    pub fn parse(what: &'static str, reason: impl ToString) -> Self {
        Self::Parse {
            what,
            reason: reason.to_string(),
        }
    }
}

/// Failures of the persistent store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Malformed request input
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures of a favorites operation
#[derive(Debug, Error)]
pub enum FavoriteError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("offer payload required to create favorite")]
    MissingOffer,
}
