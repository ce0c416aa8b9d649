//! OS-level watch handles
//!
//! A [`WatchBackend`] opens a change-notification handle on a directory and
//! forwards every native notification into an [`EventSink`] owned by the
//! watch source. Dropping the returned [`WatchHandle`] closes the OS handle.

use dirwatch_core::error::{Error, Result};
use notify::{
    Config as NotifyConfig, Event as NotifyEvent, PollWatcher, RecommendedWatcher, RecursiveMode,
    Watcher as NotifyWatcher,
};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, trace, warn};

/// One native notification, or the error the backend reported instead
pub type NativeResult = std::result::Result<NotifyEvent, notify::Error>;

/// Sending half of the notification channel
///
/// Never blocks the backend's thread. A notification that does not fit is
/// dropped and the loss is flagged so the watch source can restart
/// listening instead of carrying on with a gap.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<NativeResult>,
    lost: Arc<AtomicBool>,
}

/// Receiving half of the notification channel
#[derive(Debug)]
pub(crate) struct EventStream {
    pub(crate) rx: mpsc::Receiver<NativeResult>,
    lost: Arc<AtomicBool>,
}

impl EventSink {
    /// A bounded channel holding at most `capacity` notifications
    pub(crate) fn channel(capacity: usize) -> (EventSink, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        let lost = Arc::new(AtomicBool::new(false));
        (
            EventSink {
                tx,
                lost: Arc::clone(&lost),
            },
            EventStream { rx, lost },
        )
    }

    /// Forward one notification without waiting for capacity
    pub fn send(&self, res: NativeResult) {
        match self.tx.try_send(res) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if !self.lost.swap(true, Ordering::AcqRel) {
                    warn!("Notification channel full, native notifications lost");
                }
            }
            Err(TrySendError::Closed(_)) => trace!("Notification after listening stopped"),
        }
    }
}

impl EventStream {
    /// Whether a notification was dropped since the last call
    pub(crate) fn take_lost(&self) -> bool {
        self.lost.swap(false, Ordering::AcqRel)
    }
}

/// Opens OS change-notification handles
///
/// `open` may block (a recursive watch registers every subdirectory); the
/// watch source calls it off the async runtime.
pub trait WatchBackend: Send + Sync + 'static {
    /// Open a handle on `root`, delivering notifications to `sink`
    fn open(&self, root: &Path, recursive: bool, sink: EventSink) -> Result<WatchHandle>;
}

/// Owned OS watch handle; closed when dropped
pub struct WatchHandle {
    _inner: Box<dyn Send>,
}

impl WatchHandle {
    pub fn new<T: Send + 'static>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }

    /// Close the handle
    pub fn close(self) {
        drop(self);
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

/// Backend built on the `notify` crate
#[derive(Debug, Clone, Default)]
pub struct NotifyBackend {
    poll_interval: Option<Duration>,
}

impl NotifyBackend {
    /// Platform-native notifications (inotify, FSEvents, ReadDirectoryChangesW)
    pub fn native() -> Self {
        Self::default()
    }

    /// Periodic directory scans, for shares where native notifications are
    /// unreliable
    pub fn polling(interval: Duration) -> Self {
        Self {
            poll_interval: Some(interval),
        }
    }

    fn forward(sink: EventSink) -> impl Fn(NativeResult) + Send + 'static {
        move |res: NativeResult| sink.send(res)
    }
}

impl WatchBackend for NotifyBackend {
    fn open(&self, root: &Path, recursive: bool, sink: EventSink) -> Result<WatchHandle> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        match self.poll_interval {
            Some(interval) => {
                let config = NotifyConfig::default()
                    .with_poll_interval(interval)
                    .with_compare_contents(false);
                let mut watcher = PollWatcher::new(Self::forward(sink), config)
                    .map_err(|e| Error::watcher(format!("Failed to create poll watcher: {e}")))?;
                watcher
                    .watch(root, mode)
                    .map_err(|e| Error::watcher(format!("Failed to watch path {root:?}: {e}")))?;
                info!(path = %root.display(), recursive, ?interval, "Polling watch opened");
                Ok(WatchHandle::new(watcher))
            }
            None => {
                let mut watcher = RecommendedWatcher::new(Self::forward(sink), NotifyConfig::default())
                    .map_err(|e| Error::watcher(format!("Failed to create watcher: {e}")))?;
                watcher
                    .watch(root, mode)
                    .map_err(|e| Error::watcher(format!("Failed to watch path {root:?}: {e}")))?;
                info!(path = %root.display(), recursive, "Native watch opened");
                Ok(WatchHandle::new(watcher))
            }
        }
    }
}
