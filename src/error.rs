//! Error types for layer sampling, parameter mutation and parameter parsing.

use thiserror::Error;

use crate::layers::LayerKind;

/// Errors produced by map layers and the atlas session.
#[derive(Debug, Error)]
pub enum LayerError {
    /// A procedural parameter, resolution or region bound was rejected.
    /// The previous parameter set stays in effect.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A parameter string could not be parsed. The previous palette stays in effect.
    #[error("parameter string rejected: {0}")]
    Parse(#[from] ParseError),

    /// The layer has no notion of the requested operation.
    #[error("{layer} layer does not support {operation}")]
    Unsupported {
        layer: LayerKind,
        operation: &'static str,
    },

    /// A buffer could not be allocated within its budget.
    #[error("buffer of {requested} pixels exceeds the budget of {budget} pixels")]
    ResourceExhausted { requested: u64, budget: u64 },

    /// GPU device or texture failure.
    #[error("GPU error: {0}")]
    Gpu(String),
}

impl LayerError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        LayerError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from the `count:<N>,colors:[{r,g,b,a},...]` parameter grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected {expected} at byte {position}, found {found}")]
    Expected {
        expected: &'static str,
        found: String,
        position: usize,
    },

    #[error("number `{text}` at byte {position} is not a valid integer")]
    InvalidNumber { text: String, position: usize },

    #[error("channel value {value} at byte {position} is outside 0-255")]
    ChannelOutOfRange { value: u64, position: usize },

    #[error("count is {count} but {colors} colors were given")]
    CountMismatch { count: usize, colors: usize },

    #[error("palette must contain at least one category")]
    EmptyPalette,

    #[error("unexpected trailing input at byte {position}: `{rest}`")]
    TrailingInput { rest: String, position: usize },
}

/// Errors raised while loading an [`AtlasConfig`](crate::config::AtlasConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] LayerError),
}

pub type Result<T, E = LayerError> = std::result::Result<T, E>;
