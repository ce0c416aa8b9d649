//! Runtime configuration for the folder watcher
//!
//! [`WatcherConfig`] is passed explicitly to the controller. It is usually
//! built from the persisted [`WatchSettings`] and adjusted with the builder.

use dirwatch_core::config::WatchSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable configuration for the folder watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Delay before re-opening the watch after a failure (default: 60000ms)
    pub restart_interval_ms: u64,
    /// Bounded wait for both workers to start or exit (default: 10000ms)
    pub wait_timeout_ms: u64,
    /// Pause between empty drain cycles (default: 1000ms)
    pub drain_interval_ms: u64,
    /// Window for folding a modify into the preceding add (default: 1000ms)
    pub coalesce_window_ms: u64,
    /// Capacity of the native notification channel (default: 100000)
    pub max_queue_size: usize,
    /// Wait for a new-name half after a buffer ends on an old-name half (default: 50ms)
    pub rename_pair_window_ms: u64,
    /// Working-list capacity released once drained (default: 4096)
    pub shrink_capacity_threshold: usize,
}

impl WatcherConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from builder
    pub fn builder() -> WatcherConfigBuilder {
        WatcherConfigBuilder::default()
    }

    pub fn restart_interval(&self) -> Duration {
        Duration::from_millis(self.restart_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn rename_pair_window(&self) -> Duration {
        Duration::from_millis(self.rename_pair_window_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::from(&WatchSettings::default())
    }
}

impl From<&WatchSettings> for WatcherConfig {
    fn from(settings: &WatchSettings) -> Self {
        Self {
            restart_interval_ms: settings.restart_interval_ms,
            wait_timeout_ms: settings.wait_timeout_ms,
            drain_interval_ms: settings.drain_interval_ms,
            coalesce_window_ms: settings.coalesce_window_ms,
            max_queue_size: settings.max_queue_size,
            rename_pair_window_ms: settings.rename_pair_window_ms,
            shrink_capacity_threshold: settings.shrink_capacity_threshold,
        }
    }
}

/// Builder for WatcherConfig
#[derive(Debug, Default)]
pub struct WatcherConfigBuilder {
    config: WatcherConfig,
}

impl WatcherConfigBuilder {
    /// Set restart interval in milliseconds
    pub fn restart_interval_ms(mut self, ms: u64) -> Self {
        self.config.restart_interval_ms = ms;
        self
    }

    /// Set start/stop wait timeout in milliseconds
    pub fn wait_timeout_ms(mut self, ms: u64) -> Self {
        self.config.wait_timeout_ms = ms;
        self
    }

    /// Set drain interval in milliseconds
    pub fn drain_interval_ms(mut self, ms: u64) -> Self {
        self.config.drain_interval_ms = ms;
        self
    }

    /// Set coalesce window in milliseconds
    pub fn coalesce_window_ms(mut self, ms: u64) -> Self {
        self.config.coalesce_window_ms = ms;
        self
    }

    /// Set native notification channel capacity
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.config.max_queue_size = size;
        self
    }

    /// Set rename pairing window in milliseconds
    pub fn rename_pair_window_ms(mut self, ms: u64) -> Self {
        self.config.rename_pair_window_ms = ms;
        self
    }

    /// Set the working-list capacity threshold
    pub fn shrink_capacity_threshold(mut self, capacity: usize) -> Self {
        self.config.shrink_capacity_threshold = capacity;
        self
    }

    /// Build the configuration
    pub fn build(self) -> WatcherConfig {
        self.config
    }
}
