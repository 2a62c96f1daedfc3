//! The set of files the current artifact depends on.
//!
//! [`WatchedModuleSet`] maps every watched physical path to the module ids it
//! backs, and caches the last-seen source of every module id. Reconciliation
//! patches the watch list to match a new dependency graph; filesystem events
//! are filtered through the source cache so that touching a file without
//! changing it never triggers a rebuild.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rewatch_config::{ConfigError, WatchConfig, resolve_path};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::backend::{BackendError, FsEvent, FsEventKind, WatchBackend};
use crate::engine::ModuleRecord;
use crate::error::ConfigurationError;

/// What a successful reconciliation changed.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Paths that started being watched.
    pub added: Vec<PathBuf>,
    /// Paths that stopped being watched.
    pub removed: Vec<PathBuf>,
    /// Paths the backend refused to watch. They are retried on the next
    /// reconciliation.
    pub failures: Vec<BackendError>,
}

impl ReconcileReport {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failures.is_empty()
    }
}

pub struct WatchedModuleSet {
    backend: Box<dyn WatchBackend>,
    cwd: PathBuf,
    destinations: FxHashSet<PathBuf>,
    watched: FxHashMap<PathBuf, BTreeSet<String>>,
    sources: FxHashMap<String, String>,
    closed: bool,
}

impl std::fmt::Debug for WatchedModuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchedModuleSet")
            .field("cwd", &self.cwd)
            .field("destinations", &self.destinations)
            .field("watched", &self.watched)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl WatchedModuleSet {
    /// Create an empty set guarding `destinations`.
    ///
    /// Relative module ids and destinations resolve against `cwd`.
    pub fn new(
        backend: Box<dyn WatchBackend>,
        cwd: impl Into<PathBuf>,
        destinations: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let cwd = cwd.into();
        let destinations = destinations
            .into_iter()
            .map(|dest| resolve_path(&cwd, &dest))
            .collect();
        Self {
            backend,
            cwd,
            destinations,
            watched: FxHashMap::default(),
            sources: FxHashMap::default(),
            closed: false,
        }
    }

    /// Create a set for `config`.
    ///
    /// Destinations are only guarded when the config writes to disk: an
    /// in-memory build never produces the file it would be watching.
    pub fn from_config(
        backend: Box<dyn WatchBackend>,
        config: &WatchConfig,
    ) -> Result<Self, ConfigError> {
        let cwd = config.working_dir()?;
        let destinations = if config.watch.write {
            config.destination_paths()?
        } else {
            Vec::new()
        };
        Ok(Self::new(backend, cwd, destinations))
    }

    /// Patch the watch list to match a new dependency graph.
    ///
    /// The destination guard runs before anything is mutated, so a rejected
    /// graph leaves the previous watch list in place. Destinations are matched
    /// both as configured and through symlinks. Modules whose file does not
    /// exist are dropped silently.
    pub async fn reconcile(
        &mut self,
        records: &[ModuleRecord],
    ) -> Result<ReconcileReport, ConfigurationError> {
        let mut report = ReconcileReport::default();
        if self.closed {
            return Ok(report);
        }

        let real_destinations = canonical_destinations(&self.destinations).await;
        let is_destination =
            |path: &Path| self.destinations.contains(path) || real_destinations.contains(path);

        let records: Vec<&ModuleRecord> = records.iter().filter(|r| !r.is_virtual()).collect();
        for record in &records {
            let lexical = [Path::new(&record.id), record.source_path()];
            for candidate in lexical {
                let resolved = resolve_path(&self.cwd, candidate);
                if is_destination(&resolved) {
                    return Err(ConfigurationError::WatchesOutput(resolved));
                }
            }
        }

        let mut next: FxHashMap<PathBuf, BTreeSet<String>> = FxHashMap::default();
        let mut sources: FxHashMap<String, String> = FxHashMap::default();
        for record in records {
            let path = resolve_path(&self.cwd, record.source_path());
            let real = match tokio::fs::canonicalize(&path).await {
                Ok(real) => real,
                Err(error) => {
                    tracing::trace!(id = %record.id, %error, "module has no file, not watching");
                    continue;
                }
            };
            if is_destination(&real) {
                return Err(ConfigurationError::WatchesOutput(real));
            }

            next.entry(real).or_default().insert(record.id.clone());
            sources
                .entry(record.id.clone())
                .or_insert_with(|| record.original_source.clone());
        }

        let stale: Vec<PathBuf> = self
            .watched
            .keys()
            .filter(|path| !next.contains_key(*path))
            .cloned()
            .collect();
        for path in stale {
            self.release(&path);
            report.removed.push(path);
        }

        let mut refused = Vec::new();
        for path in next.keys() {
            if self.watched.contains_key(path) {
                continue;
            }
            match self.backend.watch(path) {
                Ok(()) => report.added.push(path.clone()),
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "could not watch module");
                    refused.push(path.clone());
                    report.failures.push(error);
                }
            }
        }
        for path in refused {
            next.remove(&path);
        }

        self.watched = next;
        self.sources = sources;

        tracing::debug!(
            watched = self.watched.len(),
            added = report.added.len(),
            removed = report.removed.len(),
            "reconciled watched modules"
        );
        Ok(report)
    }

    /// Apply a filesystem event. Returns `true` when a rebuild is needed.
    pub async fn handle_event(&mut self, event: &FsEvent) -> bool {
        if self.closed {
            return false;
        }
        let Some(path) = self.lookup(&event.path).await else {
            return false;
        };

        match event.kind {
            FsEventKind::Removed | FsEventKind::Renamed => {
                tracing::debug!(path = %path.display(), kind = ?event.kind, "watched module went away");
                self.release(&path);
                true
            }
            FsEventKind::Added | FsEventKind::Changed => {
                let content = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(error) => {
                        tracing::debug!(path = %path.display(), %error, "could not read changed module");
                        return true;
                    }
                };

                let mut changed = false;
                if let Some(ids) = self.watched.get(&path) {
                    for id in ids {
                        if self.sources.get(id) != Some(&content) {
                            self.sources.insert(id.clone(), content.clone());
                            changed = true;
                        }
                    }
                }
                if !changed {
                    tracing::trace!(path = %path.display(), "content unchanged");
                }
                changed
            }
        }
    }

    /// Watch the file that made a build fail.
    ///
    /// The file is attributed to a module id equal to its path, with its
    /// current content cached, so the next real edit triggers a rebuild.
    /// Returns `false` when the file does not exist or is a destination.
    pub async fn watch_origin(&mut self, path: &Path) -> Result<bool, BackendError> {
        if self.closed {
            return Ok(false);
        }
        let path = resolve_path(&self.cwd, path);
        if self.destinations.contains(&path) {
            return Ok(false);
        }
        let Ok(real) = tokio::fs::canonicalize(&path).await else {
            return Ok(false);
        };
        if self.destinations.contains(&real)
            || canonical_destinations(&self.destinations)
                .await
                .contains(&real)
        {
            return Ok(false);
        }

        if !self.watched.contains_key(&real) {
            self.backend.watch(&real)?;
            tracing::debug!(path = %real.display(), "watching failed module");
        }
        let id = path.to_string_lossy().into_owned();
        match tokio::fs::read_to_string(&real).await {
            Ok(content) => {
                self.sources.insert(id.clone(), content);
            }
            // Uncached, so the next notification counts as a change.
            Err(error) => {
                tracing::debug!(path = %real.display(), %error, "could not read failed module");
                self.sources.remove(&id);
            }
        }
        self.watched.entry(real).or_default().insert(id);
        Ok(true)
    }

    /// Release every watch. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.watched.clear();
        self.sources.clear();
        self.backend.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.contains_key(path)
    }

    /// Watched paths, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.watched.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Module ids backed by `path`.
    pub fn modules_for(&self, path: &Path) -> Option<&BTreeSet<String>> {
        self.watched.get(path)
    }

    pub fn cached_source(&self, id: &str) -> Option<&str> {
        self.sources.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    async fn lookup(&mut self, path: &Path) -> Option<PathBuf> {
        if self.watched.contains_key(path) {
            return Some(path.to_path_buf());
        }
        let path = resolve_path(&self.cwd, path);
        if self.watched.contains_key(&path) {
            return Some(path);
        }
        let real = tokio::fs::canonicalize(&path).await.ok()?;
        self.watched.contains_key(&real).then_some(real)
    }

    fn release(&mut self, path: &Path) {
        self.watched.remove(path);
        if let Err(error) = self.backend.unwatch(path) {
            tracing::debug!(path = %path.display(), %error, "unwatch failed");
        }
    }
}

/// Destinations with symlinks resolved.
///
/// A destination that does not exist yet is resolved through its parent
/// directory. Destinations whose directory is missing are skipped.
async fn canonical_destinations(destinations: &FxHashSet<PathBuf>) -> FxHashSet<PathBuf> {
    let mut real = FxHashSet::default();
    for dest in destinations {
        if let Ok(path) = tokio::fs::canonicalize(dest).await {
            real.insert(path);
            continue;
        }
        let (Some(parent), Some(name)) = (dest.parent(), dest.file_name()) else {
            continue;
        };
        if let Ok(parent) = tokio::fs::canonicalize(parent).await {
            real.insert(parent.join(name));
        }
    }
    real
}
