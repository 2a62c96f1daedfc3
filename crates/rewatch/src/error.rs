//! Error types carried by the watch event stream.
//!
//! Nothing here is ever returned synchronously from [`crate::watch`]: build
//! and configuration failures travel inside [`crate::WatchEvent::Error`],
//! orchestration faults inside [`crate::WatchEvent::WatcherError`].
//!
//! - [`ConfigurationError`] is detected by rewatch itself (for example an
//!   artifact that would watch its own output). It is not retryable: the
//!   config has to change.
//! - [`BuildError`] is an opaque failure reported by the bundling engine. It
//!   is retryable by definition, the next edit to a watched file triggers a
//!   fresh attempt.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::backend::BackendError;

/// Configuration rejected by rewatch before or during a build.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A module in the dependency graph is one of the configured destinations.
    #[error("Cannot import the generated bundle: {}", .0.display())]
    WatchesOutput(PathBuf),

    /// The watch configuration itself is invalid.
    #[error(transparent)]
    Invalid(#[from] rewatch_config::ConfigError),
}

/// Failure reported by the bundling engine.
///
/// Engines fill in whatever they know: a machine-readable `code`
/// (`UNRESOLVED_ENTRY`, `PARSE_ERROR`, ...) and the `file` that caused the
/// failure. The file is used to keep watching the culprit when the build
/// never got far enough to report a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BuildError {
    pub code: Option<String>,
    pub message: String,
    pub file: Option<PathBuf>,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            file: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

/// Any error surfaced through the event stream.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("File watcher error: {0}")]
    Backend(#[from] BackendError),

    /// A build task panicked or was cancelled.
    #[error("Build task failed: {0}")]
    Task(String),
}

/// Result type alias for rewatch operations.
pub type Result<T, E = WatchError> = std::result::Result<T, E>;

impl WatchError {
    /// Whether editing a watched file may fix this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WatchError::Build(_))
    }

    pub fn as_build(&self) -> Option<&BuildError> {
        match self {
            WatchError::Build(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_configuration(&self) -> Option<&ConfigurationError> {
        match self {
            WatchError::Configuration(error) => Some(error),
            _ => None,
        }
    }
}

impl From<rewatch_config::ConfigError> for WatchError {
    fn from(error: rewatch_config::ConfigError) -> Self {
        WatchError::Configuration(error.into())
    }
}

impl miette::Diagnostic for WatchError {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        if let WatchError::Build(BuildError {
            code: Some(code), ..
        }) = self
        {
            return Some(Box::new(code));
        }

        let code = match self {
            WatchError::Configuration(ConfigurationError::WatchesOutput(_)) => "WATCHES_OUTPUT",
            WatchError::Configuration(ConfigurationError::Invalid(_)) => "INVALID_CONFIG",
            WatchError::Build(_) => "BUILD_ERROR",
            WatchError::Backend(_) => "WATCH_BACKEND_ERROR",
            WatchError::Task(_) => "WATCHER_ERROR",
        };
        Some(Box::new(code))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            WatchError::Configuration(ConfigurationError::WatchesOutput(path)) => {
                Some(Box::new(format!(
                    "'{}' is a build destination. Remove the import or write the artifact somewhere else.",
                    path.display()
                )))
            }
            WatchError::Configuration(ConfigurationError::Invalid(_)) => Some(Box::new(
                "Fix the watch configuration and restart; this error does not clear on its own.",
            )),
            WatchError::Build(error) => error.file().map(|file| {
                Box::new(format!(
                    "Fix {} and save; a rebuild starts automatically.",
                    file.display()
                )) as Box<dyn std::fmt::Display>
            }),
            _ => None,
        }
    }
}
