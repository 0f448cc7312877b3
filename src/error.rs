//! Error taxonomy for tracing sessions
//!
//! Failures raised by a wrapped callable are deliberately absent here: they
//! travel through the wrapper as the original `anyhow::Error`, untouched.

use thiserror::Error;

/// Errors raised by the session, patcher and configuration layers
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Unit not found in registry: {unit}")]
    NotFound { unit: String },

    #[error("Session for '{unit}' is already active or has ended")]
    AlreadyActive { unit: String },

    #[error("Session for '{unit}' is not active")]
    NotActive { unit: String },

    #[error("Invalid session configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tracing operations
pub type Result<T> = std::result::Result<T, TraceError>;
