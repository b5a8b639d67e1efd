use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the client layer.
///
/// `Clone` so one failure can be handed to every caller waiting on the same
/// in-flight watch.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(Arc<anyhow::Error>),

    #[error("invalid channel id '{0}', expected 'type:id'")]
    InvalidCid(String),

    #[error("invalid value '{value}' for {key}")]
    Config { key: String, value: String },
}

impl From<anyhow::Error> for ClientError {
    fn from(err: anyhow::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
