//! Error types for configuration validation and loading.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    // Config file loading errors
    #[error("config not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    // Schema validation errors (no filesystem checks)
    #[error("no input specified")]
    NoInput,

    #[error("no output destination configured (set 'dest' or 'targets')")]
    NoDestination,

    #[error("output destination listed twice: {}", .0.display())]
    DuplicateDestination(PathBuf),

    #[error("invalid value for '{field}': {hint}")]
    InvalidValue { field: String, hint: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Extract(Box::new(error))
    }
}
