use thiserror::Error;

use crate::layer::Layer;
use crate::logging::LoggingError;

/// Unified result type for the navigation engine.
pub type Result<T> = std::result::Result<T, NavError>;

/// Errors surfaced by the focus and layer-navigation engine.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("transition from {from} to {to} is not allowed")]
    InvalidTransition { from: Layer, to: Layer },
    #[error("a layer transition is already in progress")]
    TransitionInProgress,
    #[error("layer {0} is already current")]
    AlreadyCurrent(Layer),
    #[error("content load failed: {0}")]
    ContentLoad(String),
    #[error("content `{screen_id}` did not report ready within {waited_ms}ms")]
    ContentTimeout { screen_id: String, waited_ms: u64 },
    #[error("{layer} surface error: {message}")]
    Surface { layer: Layer, message: String },
    #[error("key handler failed: {0}")]
    Handler(String),
    #[error("content message rejected: {0}")]
    Message(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Logging(#[from] LoggingError),
}

impl NavError {
    pub fn surface(layer: Layer, message: impl Into<String>) -> Self {
        Self::Surface {
            layer,
            message: message.into(),
        }
    }
}
