//! ASCII Chat CLI library
//!
//! Console front end for the ASCII video chat session: argument parsing,
//! layered configuration, a line-oriented console collaborator, slash
//! commands and a test-pattern video source.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod pattern;

pub use app::ChatApp;
pub use cli::Cli;
pub use config::{AppConfig, ConfigError};
pub use error::{CliError, Result};
