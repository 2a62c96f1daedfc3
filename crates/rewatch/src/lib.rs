//! Incremental build-watch orchestration.
//!
//! rewatch sits between a bundling engine and the filesystem. It runs an
//! initial build, watches exactly the files the artifact was built from, and
//! rebuilds whenever one of them really changes:
//!
//! - bursts of changes are debounced into a single rebuild
//! - at most one build is in flight; changes during a build queue one more
//! - files that leave the dependency graph stop being watched
//! - an artifact that imports its own destination is rejected
//!
//! The engine is abstracted by [`BundleEngine`], the filesystem by
//! [`WatchBackend`] ([`NotifyBackend`] by default). Progress is reported as a
//! stream of [`WatchEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use rewatch::{WatchConfig, WatchEvent, OutputFormat};
//!
//! let config = WatchConfig::new("src/main.js")
//!     .dest("dist/bundle.js")
//!     .format(OutputFormat::Cjs);
//!
//! let mut watcher = rewatch::watch(MyEngine::default(), config);
//! while let Some(event) = watcher.next_event().await {
//!     if let WatchEvent::Error { error } = &event {
//!         eprintln!("{error}");
//!     }
//! }
//! ```

pub mod backend;
pub mod engine;
pub mod error;
pub mod events;
pub mod modules;
pub mod origin;
pub mod output;
pub mod scheduler;
pub mod sourcemap;

#[cfg(feature = "logging")]
pub mod logging;

pub use backend::{
    BackendError, FsEvent, FsEventKind, FsEventReceiver, FsEventSender, NotifyBackend,
    WatchBackend,
};
pub use engine::{Artifact, BundleEngine, ModuleRecord, RenderedChunk, VIRTUAL_MARKER};
pub use error::{BuildError, ConfigurationError, Result, WatchError};
pub use events::WatchEvent;
pub use modules::{ReconcileReport, WatchedModuleSet};
pub use origin::failure_origin;
pub use output::{FileMap, OutputModes};
pub use scheduler::{Watcher, watch};

// Re-export configuration so engines depend on one crate
pub use rewatch_config as config;
pub use rewatch_config::{
    ConfigError, OutputFormat, OutputTarget, SourceMapMode, WatchConfig, WatchOptions,
};
