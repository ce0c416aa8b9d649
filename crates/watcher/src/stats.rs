//! Counters shared between the watch workers and the controller

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one watcher, updated by both workers
#[derive(Debug, Default)]
pub struct WatchStats {
    queued: AtomicU64,
    dispatched: AtomicU64,
    filtered: AtomicU64,
    coalesced: AtomicU64,
    deferred: AtomicU64,
    source_restarts: AtomicU64,
}

/// Point-in-time copy of [`WatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchStatsSnapshot {
    /// Events pushed to the queue by the watch source
    pub queued: u64,
    /// Handler invocations
    pub dispatched: u64,
    /// Events discarded by the subscription mask
    pub filtered: u64,
    /// Modify/add events folded into a preceding add
    pub coalesced: u64,
    /// Readiness-gate deferrals (one per event per failed drain cycle)
    pub deferred: u64,
    /// Times the watch source re-entered its retry loop
    pub source_restarts: u64,
}

impl WatchStats {
    pub(crate) fn record_queued(&self, n: usize) {
        self.queued.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_restart(&self) {
        self.source_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WatchStatsSnapshot {
        WatchStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            source_restarts: self.source_restarts.load(Ordering::Relaxed),
        }
    }
}
