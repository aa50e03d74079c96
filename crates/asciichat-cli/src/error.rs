//! Error handling for the ASCII chat CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] asciichat_runtime::SessionError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
