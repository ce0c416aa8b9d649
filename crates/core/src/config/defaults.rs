//! Default values and functions for configuration

// Default constants
pub(crate) const DEFAULT_RESTART_INTERVAL_MS: u64 = 60_000;
pub(crate) const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_DRAIN_INTERVAL_MS: u64 = 1_000;
pub(crate) const DEFAULT_COALESCE_WINDOW_MS: u64 = 1_000;
pub(crate) const DEFAULT_MAX_QUEUE_SIZE: usize = 100_000;
pub(crate) const DEFAULT_RENAME_PAIR_WINDOW_MS: u64 = 50;
pub(crate) const DEFAULT_SHRINK_CAPACITY_THRESHOLD: usize = 4_096;

pub(crate) fn default_restart_interval_ms() -> u64 {
    DEFAULT_RESTART_INTERVAL_MS
}

pub(crate) fn default_wait_timeout_ms() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

pub(crate) fn default_drain_interval_ms() -> u64 {
    DEFAULT_DRAIN_INTERVAL_MS
}

pub(crate) fn default_coalesce_window_ms() -> u64 {
    DEFAULT_COALESCE_WINDOW_MS
}

pub(crate) fn default_max_queue_size() -> usize {
    DEFAULT_MAX_QUEUE_SIZE
}

pub(crate) fn default_rename_pair_window_ms() -> u64 {
    DEFAULT_RENAME_PAIR_WINDOW_MS
}

pub(crate) fn default_shrink_capacity_threshold() -> usize {
    DEFAULT_SHRINK_CAPACITY_THRESHOLD
}
