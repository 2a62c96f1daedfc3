//! The top-level [`WatchConfig`] and its output targets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, Result};
use crate::types::{OutputFormat, SourceMapMode};
use crate::validation::resolve_path;
use crate::watch::WatchOptions;

/// One artifact destination and the options used to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTarget {
    /// Where the rendered artifact is written (and its key in in-memory maps).
    pub dest: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,

    /// Falls back to the config-level mode when unset.
    #[serde(default, alias = "sourceMap", alias = "sourcemap")]
    pub source_map: Option<SourceMapMode>,

    /// Engine-specific per-target options, passed through untouched.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl OutputTarget {
    pub fn new(dest: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dest: dest.into(),
            format,
            source_map: None,
            options: Map::new(),
        }
    }

    pub fn with_source_map(mut self, mode: SourceMapMode) -> Self {
        self.source_map = Some(mode);
        self
    }

    /// Effective source map mode for this target.
    pub fn source_map(&self) -> SourceMapMode {
        self.source_map.unwrap_or_default()
    }

    /// Path of the adjoining map file (`<dest>.map`).
    pub fn map_path(&self) -> PathBuf {
        let mut path = self.dest.clone().into_os_string();
        path.push(".map");
        PathBuf::from(path)
    }
}

/// Build-watch configuration.
///
/// # Example
///
/// ```
/// use rewatch_config::{OutputFormat, OutputTarget, WatchConfig};
///
/// let config = WatchConfig::new("src/main.js")
///     .target(OutputTarget::new("dist/bundle.cjs.js", OutputFormat::Cjs))
///     .target(OutputTarget::new("dist/bundle.es.js", OutputFormat::Es))
///     .in_memory(true)
///     .write(false);
///
/// assert_eq!(config.targets().unwrap().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Entry module handed to the bundling engine.
    #[serde(alias = "entry")]
    pub input: PathBuf,

    /// Single destination, used when `targets` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,

    /// Format of the single `dest` target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,

    #[serde(default, alias = "sourceMap", alias = "sourcemap")]
    pub source_map: SourceMapMode,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<OutputTarget>,

    #[serde(default)]
    pub watch: WatchOptions,

    /// Directory relative paths resolve against (defaults to the process cwd).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Everything else is bundling-engine configuration, passed through.
    #[serde(flatten)]
    pub engine: Map<String, Value>,
}

impl WatchConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            dest: None,
            format: None,
            source_map: SourceMapMode::None,
            targets: Vec::new(),
            watch: WatchOptions::default(),
            cwd: None,
            engine: Map::new(),
        }
    }

    /// Create from serde_json::Value (for programmatic config)
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: e.to_string(),
        })
    }

    pub fn dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn target(mut self, target: OutputTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn source_map(mut self, mode: SourceMapMode) -> Self {
        self.source_map = mode;
        self
    }

    pub fn in_memory(mut self, enabled: bool) -> Self {
        self.watch.in_memory = enabled;
        self
    }

    pub fn write(mut self, enabled: bool) -> Self {
        self.watch.write = enabled;
        self
    }

    pub fn debounce_ms(mut self, delay: u64) -> Self {
        self.watch.debounce_ms = delay;
        self
    }

    pub fn use_polling(mut self, enabled: bool) -> Self {
        self.watch.use_polling = enabled;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set a passthrough engine option.
    pub fn engine_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.engine.insert(key.into(), value);
        self
    }

    /// Resolve the list of targets to serialize.
    ///
    /// Explicit `targets` win; each one inherits the config-level source map
    /// mode unless it sets its own. Otherwise a single target is built from
    /// `dest` and `format`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoDestination`] when neither is configured.
    pub fn targets(&self) -> Result<Vec<OutputTarget>> {
        if !self.targets.is_empty() {
            return Ok(self
                .targets
                .iter()
                .cloned()
                .map(|mut target| {
                    target.source_map.get_or_insert(self.source_map);
                    target
                })
                .collect());
        }

        let dest = self.dest.clone().ok_or(ConfigError::NoDestination)?;
        Ok(vec![OutputTarget {
            dest,
            format: self.format.unwrap_or_default(),
            source_map: Some(self.source_map),
            options: Map::new(),
        }])
    }

    /// Directory relative paths resolve against.
    pub fn working_dir(&self) -> Result<PathBuf> {
        let current = std::env::current_dir()?;
        Ok(match &self.cwd {
            Some(cwd) => resolve_path(&current, cwd),
            None => current,
        })
    }

    /// Resolve a config-relative path to an absolute, normalized one.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        Ok(resolve_path(&self.working_dir()?, path))
    }

    /// Absolute, lexically normalized destination paths of every target.
    pub fn destination_paths(&self) -> Result<Vec<PathBuf>> {
        let cwd = self.working_dir()?;
        Ok(self
            .targets()?
            .iter()
            .map(|target| resolve_path(&cwd, &target.dest))
            .collect())
    }
}
