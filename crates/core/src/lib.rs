#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Core types for the dirwatch folder-watch engine
//!
//! This crate provides the foundational pieces shared by the watcher and
//! its host processes:
//!
//! - **Configuration**: the persisted watch settings store
//! - **Error handling**: unified error types
//!

pub mod config;
pub mod error;

// Re-export main types for convenience
pub use config::{Config, WatchSettings};
pub use error::{Error, Result, ResultExt};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, WatchSettings};
    pub use crate::error::{Result, ResultExt};
}
