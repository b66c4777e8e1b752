//! Error types for gs-core

use thiserror::Error;

/// Core error type for the Geostash database tooling
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Failed to parse configuration file
    #[error("[C002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// C003: Invalid configuration value
    #[error("[C003] Invalid config: {message}")]
    ConfigInvalid { message: String },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
