use thiserror::Error;

/// Portal-wide error taxonomy.
///
/// `Validation` is surfaced inline and rejects the edit before any state
/// mutation. `NotFound` means a stale identifier (record deleted elsewhere).
/// `Network` is distinguished from remote failures so the auto-save engine
/// can report `offline` instead of `error`. `Auth` is never retried
/// silently; the only recovery is re-authentication.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network unavailable: {0}")]
    Network(String),

    #[error("Authentication required: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;
