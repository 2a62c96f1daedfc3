//! File-based config loading with environment overrides.
//!
//! Priority: environment variables > config file. Environment keys use the
//! `REWATCH_` prefix and `__` as the nesting separator, so
//! `REWATCH_WATCH__DEBOUNCE_MS=200` overrides `watch.debounce_ms`.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Toml},
};

use crate::config::WatchConfig;
use crate::error::{ConfigError, Result};

/// Config file names searched by [`discover`], in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["rewatch.toml", "rewatch.json"];

/// Default environment prefix.
pub const ENV_PREFIX: &str = "REWATCH_";

/// Layered configuration loader.
///
/// # Example
///
/// ```no_run
/// use rewatch_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .file("rewatch.toml")
///     .load()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Read configuration from a `.toml` or `.json` file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Override the environment variable prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Merge all sources, extract and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or has an unknown extension,
    /// if extraction fails, or if the merged config does not validate.
    pub fn load(&self) -> Result<WatchConfig> {
        let mut figment = Figment::new();

        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.clone()));
            }
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                other => {
                    return Err(ConfigError::UnsupportedFormat(
                        other.unwrap_or("<none>").to_string(),
                    ));
                }
            };
            tracing::debug!(path = %path.display(), "loading watch configuration");
        }

        figment = figment.merge(Env::prefixed(&self.env_prefix).split("__"));

        let config: WatchConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from a specific file.
pub fn load(path: impl AsRef<Path>) -> Result<WatchConfig> {
    ConfigLoader::new().file(path.as_ref()).load()
}

/// Find a config file in `root` and load it.
///
/// Relative paths in the loaded config resolve against `root` unless the
/// file sets `cwd` itself.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] if none of [`CONFIG_FILE_NAMES`] exists.
pub fn discover(root: impl AsRef<Path>) -> Result<WatchConfig> {
    let root = root.as_ref();
    let path = CONFIG_FILE_NAMES
        .iter()
        .map(|name| root.join(name))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| ConfigError::NotFound(root.join(CONFIG_FILE_NAMES[0])))?;

    let mut config = load(&path)?;
    if config.cwd.is_none() {
        config.cwd = Some(root.to_path_buf());
    }
    Ok(config)
}
