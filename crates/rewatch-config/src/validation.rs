//! Schema validation and path normalization.
//!
//! Validation is purely structural: no file is required to exist, since the
//! entry might be produced by a plugin and destinations are created on the
//! first write.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use path_clean::PathClean;

use crate::config::WatchConfig;
use crate::error::{ConfigError, Result};

/// Upper bound for `watch.debounce_ms`.
pub const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Join `path` onto `base` unless it is already absolute, then normalize
/// `.` and `..` components lexically.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf().clean()
    } else {
        base.join(path).clean()
    }
}

impl WatchConfig {
    /// Validate the configuration before the first build.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input is empty
    /// - No destination is configured, or one is listed twice
    /// - Neither writing nor in-memory rendering is enabled
    /// - Debounce or poll intervals are out of range
    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            return Err(ConfigError::NoInput);
        }

        let targets = self.targets()?;
        let cwd = self.working_dir()?;
        let mut seen = HashSet::new();
        for target in &targets {
            if target.dest.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "dest".to_string(),
                    hint: "destination paths cannot be empty".to_string(),
                });
            }
            let resolved = resolve_path(&cwd, &target.dest);
            if !seen.insert(resolved) {
                return Err(ConfigError::DuplicateDestination(target.dest.clone()));
            }
        }

        if !self.watch.write && !self.watch.in_memory {
            return Err(ConfigError::InvalidValue {
                field: "watch.write".to_string(),
                hint: "enable 'watch.write' or 'watch.in_memory', otherwise builds produce nothing"
                    .to_string(),
            });
        }

        if self.watch.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::InvalidValue {
                field: "watch.debounce_ms".to_string(),
                hint: format!("must be at most {MAX_DEBOUNCE_MS}ms"),
            });
        }

        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch.poll_interval_ms".to_string(),
                hint: "must be greater than zero".to_string(),
            });
        }

        tracing::debug!(
            input = %self.input.display(),
            targets = targets.len(),
            "configuration validated"
        );
        Ok(())
    }
}
