//! Watch source
//!
//! Owns the OS watch handle. Each pass opens a handle, then waits for either
//! native notifications or the stop signal; every wake-up decodes the
//! available notifications as one buffer and pushes the results to the event
//! queue. Any failure closes the handle, sleeps for the restart interval and
//! starts over, until stopped.

use crate::backend::{EventSink, EventStream, NativeResult, WatchBackend, WatchHandle};
use crate::config::WatcherConfig;
use crate::decode::{DecodeError, NativeDecoder};
use crate::events::RawEvent;
use crate::queue::EventQueue;
use crate::stats::WatchStats;
use dirwatch_core::error::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a listening pass ended early
#[derive(Debug, thiserror::Error)]
pub(crate) enum ListenFailure {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("native watch error: {0}")]
    Native(#[from] notify::Error),
    #[error("notification channel full, notifications were lost")]
    Lost,
    #[error("notification channel closed")]
    Closed,
}

/// How one listening pass ended
#[derive(Debug)]
enum ListenOutcome {
    Stopped,
    Failed(ListenFailure),
}

pub(crate) struct WatchSource {
    root: PathBuf,
    recursive: bool,
    backend: Arc<dyn WatchBackend>,
    queue: Arc<EventQueue>,
    config: Arc<WatcherConfig>,
    cancel: CancellationToken,
    stats: Arc<WatchStats>,
}

impl WatchSource {
    pub(crate) fn new(
        root: PathBuf,
        recursive: bool,
        backend: Arc<dyn WatchBackend>,
        queue: Arc<EventQueue>,
        config: Arc<WatcherConfig>,
        cancel: CancellationToken,
        stats: Arc<WatchStats>,
    ) -> Self {
        Self {
            root,
            recursive,
            backend,
            queue,
            config,
            cancel,
            stats,
        }
    }

    /// Listen until stopped, restarting after every failure
    ///
    /// `started` fires after the first successful open.
    pub(crate) async fn run(self, started: oneshot::Sender<()>) {
        let mut started = Some(started);
        let mut retry: u64 = 0;

        loop {
            let (sink, mut stream) = EventSink::channel(self.config.max_queue_size);

            match self.open(sink).await {
                Ok(handle) => {
                    if let Some(started) = started.take() {
                        let _ = started.send(());
                    }
                    info!(path = %self.root.display(), retry, "Listening started");

                    let outcome = self.listen(&mut stream).await;
                    handle.close();
                    info!(path = %self.root.display(), retry, "Listening stopped");

                    match outcome {
                        ListenOutcome::Stopped => break,
                        ListenOutcome::Failed(reason) => {
                            warn!(path = %self.root.display(), retry, "Watch failed: {}", reason);
                        }
                    }
                }
                Err(e) => {
                    error!(
                        path = %self.root.display(),
                        retry,
                        "Could not open watch, listening stopped: {}",
                        e
                    );
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }

            retry += 1;
            self.stats.record_restart();
            debug!(
                retry,
                delay_ms = self.config.restart_interval_ms,
                "Restarting watch after delay"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.restart_interval()) => {}
            }
        }

        info!(path = %self.root.display(), retry, "Watch source exited");
    }

    /// Open the OS handle on the blocking pool
    async fn open(&self, sink: EventSink) -> Result<WatchHandle> {
        let backend = Arc::clone(&self.backend);
        let root = self.root.clone();
        let recursive = self.recursive;
        tokio::task::spawn_blocking(move || backend.open(&root, recursive, sink))
            .await
            .map_err(|e| Error::watcher(format!("Watch open task failed: {e}")))?
    }

    async fn listen(&self, stream: &mut EventStream) -> ListenOutcome {
        let mut decoder = NativeDecoder::new(self.root.clone());

        loop {
            let first = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ListenOutcome::Stopped,
                msg = stream.rx.recv() => msg,
            };
            let Some(first) = first else {
                return ListenOutcome::Failed(ListenFailure::Closed);
            };

            let mut decoded = Vec::new();
            let mut result = decode_one(&mut decoder, first, &mut decoded);
            while result.is_ok() {
                match stream.rx.try_recv() {
                    Ok(msg) => result = decode_one(&mut decoder, msg, &mut decoded),
                    Err(_) => break,
                }
            }

            // A buffer that ends on an old-name half gets a short grace
            // period for its partner
            while result.is_ok() && decoder.has_pending_rename() {
                match tokio::time::timeout(self.config.rename_pair_window(), stream.rx.recv()).await {
                    Ok(Some(msg)) => result = decode_one(&mut decoder, msg, &mut decoded),
                    Ok(None) | Err(_) => break,
                }
            }
            decoder.finish_buffer();

            if result.is_ok() && stream.take_lost() {
                result = Err(ListenFailure::Lost);
            }

            self.publish(decoded);

            if let Err(reason) = result {
                return ListenOutcome::Failed(reason);
            }
        }
    }

    fn publish(&self, decoded: Vec<RawEvent>) {
        if decoded.is_empty() {
            return;
        }
        let queued = self.queue.push_all(decoded);
        self.stats.record_queued(queued);
        debug!(queued, depth = self.queue.len(), "Queued decoded events");
    }
}

fn decode_one(
    decoder: &mut NativeDecoder,
    msg: NativeResult,
    out: &mut Vec<RawEvent>,
) -> std::result::Result<(), ListenFailure> {
    decoder.decode(&msg?, out)?;
    Ok(())
}
