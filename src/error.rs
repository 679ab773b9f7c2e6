use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Source unreachable, malformed payload, or HTTP error status.
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Calendar lookup error: {0}")]
    MirrorLookup(String),

    #[error("Calendar create error: {0}")]
    MirrorCreate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client construction. Request failures are `Fetch` or `Mirror*`.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
