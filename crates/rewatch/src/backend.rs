//! Filesystem notification backends.
//!
//! A [`WatchBackend`] watches individual files and forwards their
//! notifications as [`FsEvent`]s over an unbounded channel. The module set
//! adds and removes paths as the dependency graph changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use rewatch_config::WatchOptions;
use thiserror::Error;
use tokio::sync::mpsc;

/// Kind of filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Added,
    Changed,
    Removed,
    Renamed,
}

/// A notification for one watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

pub type FsEventSender = mpsc::UnboundedSender<FsEvent>;
pub type FsEventReceiver = mpsc::UnboundedReceiver<FsEvent>;

/// Errors raised while adding or removing watches.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to stop watching {}: {source}", path.display())]
    Unwatch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("watch backend is closed")]
    Closed,
}

/// Per-file notification source.
pub trait WatchBackend: Send {
    /// Start watching `path`.
    fn watch(&mut self, path: &Path) -> Result<(), BackendError>;

    /// Stop watching `path`.
    fn unwatch(&mut self, path: &Path) -> Result<(), BackendError>;

    /// Release every watch. Further calls to [`watch`](Self::watch) fail.
    fn close(&mut self);
}

/// [`WatchBackend`] built on `notify`.
///
/// The OS watcher is created on the first [`watch`](WatchBackend::watch)
/// call, so a build that never succeeds costs no watcher at all.
pub struct NotifyBackend {
    watcher: Option<Box<dyn Watcher + Send>>,
    events: FsEventSender,
    use_polling: bool,
    poll_interval: Duration,
    closed: bool,
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("created", &self.watcher.is_some())
            .field("use_polling", &self.use_polling)
            .field("poll_interval", &self.poll_interval)
            .field("closed", &self.closed)
            .finish()
    }
}

impl NotifyBackend {
    pub fn new(options: &WatchOptions, events: FsEventSender) -> Self {
        Self {
            watcher: None,
            events,
            use_polling: options.use_polling,
            poll_interval: Duration::from_millis(options.poll_interval_ms),
            closed: false,
        }
    }

    /// Whether the OS watcher has been created yet.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    fn watcher(&mut self, first_path: &Path) -> Result<&mut Box<dyn Watcher + Send>, BackendError> {
        if self.watcher.is_none() {
            let events = self.events.clone();
            let handler = move |result: notify::Result<Event>| match result {
                Ok(event) => forward(&events, event),
                Err(error) => tracing::warn!(%error, "file watcher reported an error"),
            };

            let created: notify::Result<Box<dyn Watcher + Send>> = if self.use_polling {
                let config = notify::Config::default()
                    .with_poll_interval(self.poll_interval)
                    .with_compare_contents(true);
                PollWatcher::new(handler, config).map(|w| Box::new(w) as Box<dyn Watcher + Send>)
            } else {
                RecommendedWatcher::new(handler, notify::Config::default())
                    .map(|w| Box::new(w) as Box<dyn Watcher + Send>)
            };

            let watcher = created.map_err(|source| BackendError::Watch {
                path: first_path.to_path_buf(),
                source,
            })?;
            tracing::debug!(polling = self.use_polling, "created file watcher");
            self.watcher = Some(watcher);
        }

        self.watcher.as_mut().ok_or(BackendError::Closed)
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, path: &Path) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::Closed);
        }
        self.watcher(path)?
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| BackendError::Watch {
                path: path.to_path_buf(),
                source,
            })
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), BackendError> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };
        watcher
            .unwatch(path)
            .map_err(|source| BackendError::Unwatch {
                path: path.to_path_buf(),
                source,
            })
    }

    fn close(&mut self) {
        self.closed = true;
        self.watcher = None;
    }
}

fn forward(events: &FsEventSender, event: Event) {
    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Added,
        EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Renamed,
        EventKind::Modify(_) => FsEventKind::Changed,
        EventKind::Remove(_) => FsEventKind::Removed,
        _ => return,
    };

    for path in event.paths {
        tracing::trace!(?kind, path = %path.display(), "file event");
        // The receiver is gone once the watcher shut down.
        let _ = events.send(FsEvent { kind, path });
    }
}
