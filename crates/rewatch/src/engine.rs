//! Bundling engine abstraction
//!
//! rewatch never parses or transforms source itself. It drives an external
//! engine through the [`BundleEngine`] trait and inspects the [`Artifact`] it
//! returns: the dependency graph decides what gets watched, the render and
//! write operations decide what gets emitted.
//!
//! # Example
//!
//! ```rust,ignore
//! use rewatch::{Artifact, BuildError, BundleEngine};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct MyEngine;
//!
//! #[async_trait]
//! impl BundleEngine for MyEngine {
//!     async fn produce(
//!         &self,
//!         config: &WatchConfig,
//!         cache: Option<Arc<dyn Artifact>>,
//!     ) -> Result<Arc<dyn Artifact>, BuildError> {
//!         // ...
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rewatch_config::{OutputTarget, WatchConfig};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Marker engines put in the id of synthesized helper modules.
pub const VIRTUAL_MARKER: char = '\0';

/// One dependency reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Logical module id. Usually an absolute file path.
    pub id: String,

    /// Physical file backing the module, when it differs from `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Source text the engine read for this module.
    pub original_source: String,
}

impl ModuleRecord {
    pub fn new(id: impl Into<String>, original_source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            original_source: original_source.into(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Synthesized modules have no file to watch.
    pub fn is_virtual(&self) -> bool {
        self.id.contains(VIRTUAL_MARKER)
    }

    /// File the module is read from: `path`, or the id itself.
    pub fn source_path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(&self.id))
    }
}

/// Code rendered for one output target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedChunk {
    pub code: String,
    pub map: Option<serde_json::Value>,
}

impl RenderedChunk {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }

    pub fn with_map(mut self, map: serde_json::Value) -> Self {
        self.map = Some(map);
        self
    }
}

/// A built bundle, ready to be rendered or written.
///
/// The scheduler keeps the last successful artifact and hands it back to
/// [`BundleEngine::produce`] as an incremental cache hint.
#[async_trait]
pub trait Artifact: Send + Sync + std::fmt::Debug {
    /// Every module the bundle was built from.
    fn modules(&self) -> Vec<ModuleRecord>;

    /// Render the bundle for `target` without touching the filesystem.
    async fn render(&self, target: &OutputTarget) -> Result<RenderedChunk, BuildError>;

    /// Write the bundle for `target` to its destination.
    async fn write(&self, target: &OutputTarget) -> Result<(), BuildError>;
}

/// An external bundler.
#[async_trait]
pub trait BundleEngine: Send + Sync + std::fmt::Debug {
    /// Build an artifact from `config`.
    ///
    /// `cache` is the previous successful artifact, if any.
    async fn produce(
        &self,
        config: &WatchConfig,
        cache: Option<Arc<dyn Artifact>>,
    ) -> Result<Arc<dyn Artifact>, BuildError>;
}

#[async_trait]
impl<T: BundleEngine + ?Sized> BundleEngine for Arc<T> {
    async fn produce(
        &self,
        config: &WatchConfig,
        cache: Option<Arc<dyn Artifact>>,
    ) -> Result<Arc<dyn Artifact>, BuildError> {
        (**self).produce(config, cache).await
    }
}
