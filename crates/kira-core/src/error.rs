//! Top-level error type shared across the workspace.

use thiserror::Error;

/// Errors that originate from the shared domain/config layer.
#[derive(Debug, Error)]
pub enum KiraError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },
}
