use thiserror::Error;

/// Error kinds the services distinguish. The outermost adapter (HTTP or
/// RPC-status mapping) decides how each kind is surfaced; internal messages
/// are only forwarded for the whitelisted kinds.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Prefix the message with the failing operation, keeping the kind.
    pub fn context(self, op: &str) -> Self {
        match self {
            Self::Validation(msg) => Self::Validation(format!("{op}: {msg}")),
            Self::NotFound(msg) => Self::NotFound(format!("{op}: {msg}")),
            Self::Conflict(msg) => Self::Conflict(format!("{op}: {msg}")),
            Self::Unauthenticated(msg) => Self::Unauthenticated(format!("{op}: {msg}")),
            Self::Unavailable(msg) => Self::Unavailable(format!("{op}: {msg}")),
            Self::Internal(err) => Self::Internal(err.context(op.to_string())),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut => {
                Self::Unavailable("database pool timed out".to_string())
            }
            sqlx::Error::Io(err) => Self::Unavailable(format!("database i/o error: {err}")),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}
