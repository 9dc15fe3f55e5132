use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Most variants are reported inline to the sender and leave session state
/// untouched; only `Gateway` and `Cache` represent collaborator failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("cache backend error: {0}")]
    Cache(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
