//! Watch controller
//!
//! [`FolderWatcher`] owns one watch session at a time. Starting a session
//! spawns the watch source and the dispatch engine and waits, bounded by the
//! configured timeout, for both to report ready. Stopping raises the shared
//! stop signal and waits, with the same bound, for both to exit.

use crate::backend::{NotifyBackend, WatchBackend};
use crate::config::WatcherConfig;
use crate::dispatch::{Clock, DispatchEngine, DispatchExit, OpenForRead, ReadinessProbe, SystemClock};
use crate::events::EventKindSet;
use crate::handlers::Handlers;
use crate::queue::EventQueue;
use crate::source::WatchSource;
use crate::stats::{WatchStats, WatchStatsSnapshot};
use dirwatch_core::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle state of a [`FolderWatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Starting,
    Listening,
    Stopping,
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

struct Session {
    path: PathBuf,
    recursive: bool,
    mask: EventKindSet,
    cancel: CancellationToken,
    source: JoinHandle<()>,
    dispatch: JoinHandle<DispatchExit>,
    exit_reported: AtomicBool,
}

/// Watches one folder and calls the registered handlers for its changes
pub struct FolderWatcher {
    config: Arc<WatcherConfig>,
    handlers: Arc<Handlers>,
    backend: Arc<dyn WatchBackend>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn ReadinessProbe>,
    stats: Arc<WatchStats>,
    state: WatchState,
    session: Option<Session>,
}

impl FolderWatcher {
    /// Create an idle watcher using platform-native notifications
    pub fn new(config: WatcherConfig, handlers: Handlers) -> Self {
        Self {
            config: Arc::new(config),
            handlers: Arc::new(handlers),
            backend: Arc::new(NotifyBackend::native()),
            clock: Arc::new(SystemClock),
            probe: Arc::new(OpenForRead),
            stats: Arc::new(WatchStats::default()),
            state: WatchState::Idle,
            session: None,
        }
    }

    /// Replace the backend used to open watch handles
    pub fn with_backend(mut self, backend: Arc<dyn WatchBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_readiness_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Start watching `path`, replacing any active session
    ///
    /// Returns once both workers report ready. On timeout both are told to
    /// stop and the watcher is left idle.
    pub async fn start_watching(
        &mut self,
        path: impl AsRef<Path>,
        recursive: bool,
        mask: EventKindSet,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();

        if let Some(active) = &self.session {
            info!(
                from = %active.path.display(),
                to = %path.display(),
                "Restarting watch with new parameters"
            );
            self.stop_watching().await;
        }

        if mask.is_empty() {
            warn!(path = %path.display(), "Watching with an empty event mask, no handler will fire");
        }

        self.state = WatchState::Starting;
        let cancel = CancellationToken::new();
        let queue = Arc::new(EventQueue::new());

        let source = WatchSource::new(
            path.clone(),
            recursive,
            Arc::clone(&self.backend),
            Arc::clone(&queue),
            Arc::clone(&self.config),
            cancel.clone(),
            Arc::clone(&self.stats),
        );
        let engine = DispatchEngine::new(
            queue,
            Arc::clone(&self.handlers),
            mask,
            &self.config,
            cancel.clone(),
            Arc::clone(&self.stats),
        )
        .with_clock(Arc::clone(&self.clock))
        .with_probe(Arc::clone(&self.probe));

        let (source_ready_tx, source_ready) = oneshot::channel();
        let (dispatch_ready_tx, dispatch_ready) = oneshot::channel();
        let source = tokio::spawn(source.run(source_ready_tx));
        let dispatch = tokio::spawn(engine.run(dispatch_ready_tx));

        let timeout = self.config.wait_timeout();
        let ready = tokio::time::timeout(timeout, async {
            let (source, dispatch) = tokio::join!(source_ready, dispatch_ready);
            source.is_ok() && dispatch.is_ok()
        })
        .await;

        match ready {
            Ok(true) => {
                info!(path = %path.display(), recursive, ?mask, "Listening");
                self.session = Some(Session {
                    path,
                    recursive,
                    mask,
                    cancel,
                    source,
                    dispatch,
                    exit_reported: AtomicBool::new(false),
                });
                self.state = WatchState::Listening;
                Ok(())
            }
            Ok(false) => {
                cancel.cancel();
                self.state = WatchState::Idle;
                Err(Error::watcher(format!(
                    "Watch worker for {} exited before reporting ready",
                    path.display()
                )))
            }
            Err(_) => {
                warn!(path = %path.display(), ?timeout, "Watch did not start in time, stopping workers");
                cancel.cancel();
                self.state = WatchState::Idle;
                Err(Error::startup_timeout(path.display().to_string(), timeout))
            }
        }
    }

    /// Stop the active session, if any
    ///
    /// Never fails: workers that do not exit within the wait timeout are
    /// logged and aborted.
    pub async fn stop_watching(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("Stop requested while not watching");
            self.state = WatchState::Idle;
            return;
        };

        self.state = WatchState::Stopping;
        session.cancel.cancel();

        let Session {
            path,
            mut source,
            mut dispatch,
            exit_reported,
            ..
        } = session;

        let timeout = self.config.wait_timeout();
        let joined = tokio::time::timeout(timeout, async {
            tokio::join!(&mut source, &mut dispatch)
        })
        .await;

        match joined {
            Ok((source_result, dispatch_result)) => {
                if let Err(e) = source_result {
                    warn!(path = %path.display(), "Watch source ended abnormally: {}", e);
                }
                match dispatch_result {
                    Ok(DispatchExit::Stopped) => {}
                    Ok(DispatchExit::HandlerPanicked { kind, message }) => {
                        if !exit_reported.load(Ordering::Relaxed) {
                            warn!(
                                path = %path.display(),
                                %kind,
                                "Dispatch engine exited unexpectedly: {}",
                                message
                            );
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), "Dispatch engine ended abnormally: {}", e);
                    }
                }
            }
            Err(_) => {
                warn!(path = %path.display(), ?timeout, "Watch workers did not exit in time");
                source.abort();
                dispatch.abort();
            }
        }

        self.state = WatchState::Idle;
        info!(path = %path.display(), "Stopped watching");
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Folder of the active session
    pub fn watched_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    pub fn is_recursive(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.recursive)
    }

    /// Subscribed kinds of the active session
    pub fn mask(&self) -> Option<EventKindSet> {
        self.session.as_ref().map(|s| s.mask)
    }

    /// Whether a session is active and both of its workers are still running
    ///
    /// Logs a warning the first time a worker is found to have exited on its
    /// own. The session is not restarted.
    pub fn is_listening(&self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let exited = exited_worker(session.source.is_finished(), session.dispatch.is_finished());
        if let Some(worker) = exited {
            if !session.exit_reported.swap(true, Ordering::Relaxed) {
                warn!(
                    path = %session.path.display(),
                    "{} exited unexpectedly, call stop_watching to clean up",
                    worker
                );
            }
        }
        self.state == WatchState::Listening && exited.is_none()
    }

    /// Counters accumulated over every session of this watcher
    pub fn stats(&self) -> WatchStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Name of the worker that has finished, for the exit warning
fn exited_worker(source_finished: bool, dispatch_finished: bool) -> Option<&'static str> {
    match (source_finished, dispatch_finished) {
        (false, false) => None,
        (true, false) => Some("Watch source"),
        (false, true) => Some("Dispatch engine"),
        (true, true) => Some("Watch source and dispatch engine"),
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }
}

impl fmt::Debug for FolderWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderWatcher")
            .field("state", &self.state)
            .field("path", &self.watched_path())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
