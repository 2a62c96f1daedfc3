//! Configuration for the rewatch build-watch orchestrator.
//!
//! A [`WatchConfig`] describes what to build (the input and the passthrough
//! options handed to the bundling engine), where the artifact goes (one
//! destination or several [`OutputTarget`]s) and how watching behaves
//! ([`WatchOptions`]). Configs can be built programmatically or loaded from a
//! TOML/JSON file with environment overrides via [`ConfigLoader`].

pub mod config;
pub mod discovery;
pub mod error;
pub mod types;
pub mod validation;
pub mod watch;

// Re-export main types
pub use config::*;
pub use error::*;
pub use types::*;
pub use watch::*;

pub use discovery::{ConfigLoader, discover, load};
pub use validation::{MAX_DEBOUNCE_MS, resolve_path};
