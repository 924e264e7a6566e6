use thiserror::Error;

/// Every failure surfaced by [`crate::service::MealbookService`].
#[derive(Debug, Error)]
pub enum MealbookError {
    /// Bad input shape, rejected before the store is touched.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The row store failed or returned rows that do not decode.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl MealbookError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

pub type Result<T, E = MealbookError> = std::result::Result<T, E>;
