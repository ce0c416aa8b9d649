//! Configuration module for the dirwatch system
//!
//! This module provides the persisted watch settings and loading mechanisms.
//! Configuration can be loaded from TOML files and/or environment variables.

mod defaults;
mod loading;

#[cfg(test)]
mod tests;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use defaults::*;

/// Returns the path to the global configuration file
///
/// The global config is stored at `~/.dirwatch/config.toml`.
pub fn global_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::config("Unable to determine home directory".to_string()))?;
    Ok(home_dir.join(".dirwatch").join("config.toml"))
}

/// Main configuration structure for the dirwatch system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Folder-watch settings
    #[serde(default)]
    pub watch: WatchSettings,
}

/// Persisted settings for a folder watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Delay before re-opening the watch after a failure
    #[serde(default = "default_restart_interval_ms")]
    pub restart_interval_ms: u64,

    /// Bounded wait for workers to report started/exited
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Pause between dispatch drain cycles when nothing is queued
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    /// Window in which a modify right after an add is folded into the add
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,

    /// Capacity of the channel between the OS callback and the watch source
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// How long an old-name rename half may wait for its new-name half
    #[serde(default = "default_rename_pair_window_ms")]
    pub rename_pair_window_ms: u64,

    /// Working-list capacity above which memory is released once it drains
    #[serde(default = "default_shrink_capacity_threshold")]
    pub shrink_capacity_threshold: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            restart_interval_ms: default_restart_interval_ms(),
            wait_timeout_ms: default_wait_timeout_ms(),
            drain_interval_ms: default_drain_interval_ms(),
            coalesce_window_ms: default_coalesce_window_ms(),
            max_queue_size: default_max_queue_size(),
            rename_pair_window_ms: default_rename_pair_window_ms(),
            shrink_capacity_threshold: default_shrink_capacity_threshold(),
        }
    }
}

impl WatchSettings {
    /// Restart interval as a duration
    pub fn restart_interval(&self) -> Duration {
        Duration::from_millis(self.restart_interval_ms)
    }

    /// Start/stop wait timeout as a duration
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        let watch = &self.watch;

        if watch.restart_interval_ms == 0 {
            return Err(Error::config(
                "watch.restart_interval_ms must be greater than 0".to_string(),
            ));
        }
        if watch.wait_timeout_ms == 0 {
            return Err(Error::config(
                "watch.wait_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if watch.drain_interval_ms == 0 {
            return Err(Error::config(
                "watch.drain_interval_ms must be greater than 0".to_string(),
            ));
        }
        if watch.max_queue_size == 0 {
            return Err(Error::config(
                "watch.max_queue_size must be greater than 0".to_string(),
            ));
        }
        if watch.drain_interval_ms > watch.wait_timeout_ms {
            return Err(Error::config(format!(
                "watch.drain_interval_ms ({}) must not exceed watch.wait_timeout_ms ({})",
                watch.drain_interval_ms, watch.wait_timeout_ms
            )));
        }

        Ok(())
    }
}
