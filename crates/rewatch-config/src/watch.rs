//! Watch-mode settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Render every target into memory and hand the result to the consumer.
    #[serde(default, alias = "inMemory")]
    pub in_memory: bool,

    /// Write every target to its destination on disk.
    #[serde(default = "default_write")]
    pub write: bool,

    /// Quiet period after the last change before a rebuild starts.
    #[serde(default = "default_debounce_ms", alias = "debounceMs")]
    pub debounce_ms: u64,

    /// Poll file metadata instead of relying on native notifications.
    #[serde(default = "default_use_polling", alias = "usePolling")]
    pub use_polling: bool,

    /// Interval between polls when `use_polling` is set.
    #[serde(default = "default_poll_interval_ms", alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            in_memory: false,
            write: default_write(),
            debounce_ms: default_debounce_ms(),
            use_polling: default_use_polling(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_write() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    50
}

// Native notifications are only reliable enough on macOS (FSEvents).
fn default_use_polling() -> bool {
    !cfg!(target_os = "macos")
}

fn default_poll_interval_ms() -> u64 {
    100
}
