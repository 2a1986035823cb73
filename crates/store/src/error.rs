use thiserror::Error;

use numcast_common::error::AppError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unauthorized ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("Unexpected response ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Subscription cancelled by server: {0}")]
    Cancelled(String),

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl StoreError {
    /// Whether a feed should give up instead of reconnecting.
    pub fn is_terminal(&self) -> bool {
        match self {
            StoreError::Transport(_) | StoreError::Decode(_) => false,
            StoreError::Http { status, .. } => (400..500).contains(status),
            StoreError::Unauthorized { .. }
            | StoreError::Cancelled(_)
            | StoreError::Credentials(_)
            | StoreError::Signing(_) => true,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err.to_string())
    }
}
