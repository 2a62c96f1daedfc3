use std::time::Duration;

use crate::error::WatchError;
use crate::output::FileMap;

/// Lifecycle event emitted by a [`Watcher`](crate::Watcher).
///
/// Every build emits `BuildStart` followed by exactly one of `BuildEnd` or
/// `Error`, unless the build task itself dies. `WatcherError` reports faults
/// in the watcher (including that one) and may appear at any point.
#[derive(Debug)]
pub enum WatchEvent {
    BuildStart,
    BuildEnd {
        duration: Duration,
        /// `true` for the first successful build only.
        initial: bool,
        /// In-memory output, empty unless `watch.in_memory` is set.
        files: FileMap,
    },
    Error {
        error: WatchError,
    },
    WatcherError {
        error: WatchError,
    },
}

impl WatchEvent {
    /// Wire code of the event.
    pub fn code(&self) -> &'static str {
        match self {
            WatchEvent::BuildStart => "BUILD_START",
            WatchEvent::BuildEnd { .. } => "BUILD_END",
            WatchEvent::Error { .. } => "ERROR",
            WatchEvent::WatcherError { .. } => "WATCHER_ERROR",
        }
    }

    pub fn error(&self) -> Option<&WatchError> {
        match self {
            WatchEvent::Error { error } | WatchEvent::WatcherError { error } => Some(error),
            _ => None,
        }
    }

    /// Whether this event ends a build.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WatchEvent::BuildEnd { .. } | WatchEvent::Error { .. })
    }
}

impl std::fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchEvent::BuildEnd { duration, .. } => {
                write!(f, "{} ({}ms)", self.code(), duration.as_millis())
            }
            WatchEvent::Error { error } | WatchEvent::WatcherError { error } => {
                write!(f, "{}: {error}", self.code())
            }
            WatchEvent::BuildStart => f.write_str(self.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;

    #[test]
    fn codes_match_wire_names() {
        assert_eq!(WatchEvent::BuildStart.code(), "BUILD_START");
        let end = WatchEvent::BuildEnd {
            duration: Duration::from_millis(12),
            initial: true,
            files: FileMap::new(),
        };
        assert_eq!(end.code(), "BUILD_END");
        assert_eq!(end.to_string(), "BUILD_END (12ms)");
        assert!(end.is_terminal());
    }

    #[test]
    fn error_events_expose_their_error() {
        let event = WatchEvent::Error {
            error: BuildError::new("Unexpected token").into(),
        };
        assert_eq!(event.code(), "ERROR");
        assert_eq!(event.error().unwrap().to_string(), "Unexpected token");
        assert_eq!(event.to_string(), "ERROR: Unexpected token");

        let event = WatchEvent::WatcherError {
            error: crate::WatchError::Task("panicked".into()),
        };
        assert_eq!(event.code(), "WATCHER_ERROR");
        assert!(!event.is_terminal());
    }
}
