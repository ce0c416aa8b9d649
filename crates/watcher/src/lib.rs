#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Folder watching with ordered, filtered handler dispatch
//!
//! This crate watches one directory and turns native change notifications
//! into calls to caller-supplied handlers:
//! - A self-healing watch source that reopens the OS handle after failures
//! - Rename halves merged into a single event
//! - Subscription masks over eight event kinds
//! - Add/modify coalescing and a readiness gate for files still being written
//!
//! # Example
//!
//! ```no_run
//! use dirwatch_watcher::{EventKind, FolderWatcher, Handlers, WatcherConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = Handlers::new()
//!     .on_file_added(|path| println!("added {}", path.display()))
//!     .on_file_renamed(|old, new| println!("{} -> {}", old.display(), new.display()));
//!
//! let mut watcher = FolderWatcher::new(WatcherConfig::default(), handlers);
//! watcher
//!     .start_watching("/path/to/inbox", true, EventKind::all())
//!     .await?;
//!
//! // ... later
//! watcher.stop_watching().await;
//! # Ok(())
//! # }
//! ```

// Private implementation modules
mod backend;
mod config;
mod decode;
mod dispatch;
mod events;
mod handlers;
mod queue;
mod source;
mod stats;
mod watcher;

// Public exports
pub use backend::{EventSink, NativeResult, NotifyBackend, WatchBackend, WatchHandle};
pub use config::{WatcherConfig, WatcherConfigBuilder};
pub use decode::{DecodeError, NativeDecoder};
pub use dispatch::{Clock, DispatchExit, OpenForRead, ReadinessProbe, SystemClock};
pub use events::{EntryType, EventKind, EventKindSet, RawEvent};
pub use handlers::Handlers;
pub use queue::EventQueue;
pub use stats::{WatchStats, WatchStatsSnapshot};
pub use watcher::{FolderWatcher, WatchState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::WatcherConfig;
    pub use crate::events::{EventKind, EventKindSet};
    pub use crate::handlers::Handlers;
    pub use crate::watcher::FolderWatcher;
}
