//! Locating the file that made a build fail.
//!
//! A build that fails before its first successful reconciliation has no
//! dependency graph to watch. Watching the culprit instead lets the user fix
//! it and get an automatic retry.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use rewatch_config::resolve_path;

use crate::error::BuildError;

static UNRESOLVED_FROM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)Could not resolve .* from (.*)").ok());

/// File responsible for `error`, resolved against `cwd`.
///
/// Uses the engine-reported location when there is one, otherwise the
/// importer named by a `Could not resolve <x> from <file>` message.
pub fn failure_origin(error: &BuildError, cwd: &Path) -> Option<PathBuf> {
    if let Some(file) = error.file() {
        return Some(resolve_path(cwd, file));
    }

    let captures = UNRESOLVED_FROM.as_ref()?.captures(&error.message)?;
    let importer = captures.get(1)?.as_str().trim();
    if importer.is_empty() {
        return None;
    }
    Some(resolve_path(cwd, Path::new(importer)))
}
