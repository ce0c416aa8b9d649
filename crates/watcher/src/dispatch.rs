//! Dispatch engine
//!
//! Drains the event queue into a working list and, in arrival order, filters
//! each event by the subscription mask, folds a modify (or repeated add) that
//! follows an add of the same file into that add, holds back file events
//! whose target cannot yet be opened for read, and invokes the registered
//! handler. Held-back events stay at the front of the working list and are
//! retried on the next drain cycle.

use crate::config::WatcherConfig;
use crate::events::{EventKind, EventKindSet, RawEvent};
use crate::handlers::Handlers;
use crate::queue::EventQueue;
use crate::stats::WatchStats;
use std::collections::VecDeque;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const DEFAULT_WORKING_CAPACITY: usize = 64;

/// Source of "now" for the coalescing window
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Decides whether a changed file is available to handlers yet
pub trait ReadinessProbe: Send + Sync + 'static {
    fn is_ready(&self, path: &Path) -> bool;
}

/// Ready once the file can be opened for shared read
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenForRead;

impl ReadinessProbe for OpenForRead {
    fn is_ready(&self, path: &Path) -> bool {
        File::open(path).is_ok()
    }
}

/// Why the dispatch engine stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchExit {
    /// The stop signal was honoured
    Stopped,
    /// A handler panicked; the engine stopped for the rest of the session
    HandlerPanicked { kind: EventKind, message: String },
}

#[derive(Debug)]
struct Pending {
    event: RawEvent,
    /// Mask and coalescing already applied on an earlier cycle
    screened: bool,
}

pub(crate) struct DispatchEngine {
    queue: Arc<EventQueue>,
    handlers: Arc<Handlers>,
    mask: EventKindSet,
    coalesce_window: Duration,
    drain_interval: Duration,
    shrink_threshold: usize,
    cancel: CancellationToken,
    stats: Arc<WatchStats>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn ReadinessProbe>,
    working: VecDeque<Pending>,
    last_added: Option<(PathBuf, Instant)>,
}

impl DispatchEngine {
    pub(crate) fn new(
        queue: Arc<EventQueue>,
        handlers: Arc<Handlers>,
        mask: EventKindSet,
        config: &WatcherConfig,
        cancel: CancellationToken,
        stats: Arc<WatchStats>,
    ) -> Self {
        Self {
            queue,
            handlers,
            mask,
            coalesce_window: config.coalesce_window(),
            drain_interval: config.drain_interval(),
            shrink_threshold: config.shrink_capacity_threshold,
            cancel,
            stats,
            clock: Arc::new(SystemClock),
            probe: Arc::new(OpenForRead),
            working: VecDeque::with_capacity(DEFAULT_WORKING_CAPACITY),
            last_added: None,
        }
    }

    pub(crate) fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Run drain cycles until stopped or a handler panics
    ///
    /// Each cycle runs on the blocking pool: readiness checks and handlers
    /// are synchronous caller code and must not stall the runtime.
    pub(crate) async fn run(self, started: oneshot::Sender<()>) -> DispatchExit {
        let _ = started.send(());
        info!("Dispatch engine started");

        let mut engine = self;
        let exit = loop {
            if engine.cancel.is_cancelled() {
                break DispatchExit::Stopped;
            }

            let cycle = tokio::task::spawn_blocking(move || {
                let outcome = engine.drain_once();
                (engine, outcome)
            })
            .await;
            let outcome = match cycle {
                Ok((returned, outcome)) => {
                    engine = returned;
                    outcome
                }
                Err(e) => {
                    // Handler panics are caught inside the cycle; only a
                    // runtime shutdown ends up here
                    warn!("Dispatch cycle did not complete: {}", e);
                    info!("Dispatch engine exited");
                    return DispatchExit::Stopped;
                }
            };
            if let Err(exit) = outcome {
                break exit;
            }

            engine.wait_for_work().await;
        };

        if engine.deferred() > 0 {
            debug!(
                pending = engine.deferred(),
                "Dispatch engine exiting with deferred events"
            );
        }
        info!("Dispatch engine exited");
        exit
    }

    /// Sleep until new events are queued, the drain interval passes, or stop
    ///
    /// Deferred events alone wait out the full interval before they are
    /// checked again.
    async fn wait_for_work(&self) {
        if !self.queue.is_empty() {
            return;
        }
        let interval = tokio::time::sleep(self.drain_interval);
        tokio::pin!(interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = &mut interval => return,
                _ = self.queue.pushed() => {
                    // A wake-up left over from events already drained
                    if !self.queue.is_empty() {
                        return;
                    }
                }
            }
        }
    }

    /// One drain cycle; returns how many events were pulled from the queue
    pub(crate) fn drain_once(&mut self) -> Result<usize, DispatchExit> {
        let fresh = self.queue.take_all();
        let drained = fresh.len();
        self.working.extend(fresh.into_iter().map(|event| Pending {
            event,
            screened: false,
        }));

        self.dispatch_working()?;
        self.release_capacity();
        Ok(drained)
    }

    /// Events held back by the readiness gate
    pub(crate) fn deferred(&self) -> usize {
        self.working.len()
    }

    fn dispatch_working(&mut self) -> Result<(), DispatchExit> {
        // Each entry is visited exactly once; deferred ones rotate to the
        // back and so keep their relative order ahead of the next drain
        for _ in 0..self.working.len() {
            let Some(mut pending) = self.working.pop_front() else {
                break;
            };

            if !pending.screened {
                let kind = pending.event.kind();
                if !self.mask.contains(kind) {
                    trace!(%kind, path = %pending.event.path().display(), "Filtered by mask");
                    self.stats.record_filtered();
                    continue;
                }
                if self.coalesce(&pending.event) {
                    debug!(
                        %kind,
                        path = %pending.event.path().display(),
                        "Coalesced into preceding add"
                    );
                    self.stats.record_coalesced();
                    continue;
                }
                pending.screened = true;
            }

            if pending.event.kind().is_gated() && !self.probe.is_ready(pending.event.new_path()) {
                debug!(
                    path = %pending.event.new_path().display(),
                    "Not readable yet, deferring to next drain"
                );
                self.stats.record_deferred();
                self.working.push_back(pending);
                continue;
            }

            if self.cancel.is_cancelled() {
                // No handler runs once stop has been requested
                self.working.push_front(pending);
                return Ok(());
            }
            self.invoke(&pending.event)?;
        }
        Ok(())
    }

    /// Returns true when the event continues an add seen within the window
    fn coalesce(&mut self, event: &RawEvent) -> bool {
        let now = self.clock.now();
        let continues_add = self.last_added.as_ref().is_some_and(|(path, at)| {
            path.as_path() == event.new_path()
                && now.saturating_duration_since(*at) < self.coalesce_window
        });

        match event.kind() {
            EventKind::FileAdded | EventKind::FileModified if continues_add => true,
            EventKind::FileAdded => {
                self.last_added = Some((event.new_path().to_path_buf(), now));
                false
            }
            _ => {
                self.last_added = None;
                false
            }
        }
    }

    fn invoke(&self, event: &RawEvent) -> Result<(), DispatchExit> {
        trace!(kind = %event.kind(), path = %event.path().display(), "Dispatching");
        let handlers = &self.handlers;
        match panic::catch_unwind(AssertUnwindSafe(|| handlers.dispatch(event))) {
            Ok(()) => {
                self.stats.record_dispatched();
                Ok(())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    kind = %event.kind(),
                    path = %event.path().display(),
                    "Handler panicked, stopping dispatch: {}",
                    message
                );
                Err(DispatchExit::HandlerPanicked {
                    kind: event.kind(),
                    message,
                })
            }
        }
    }

    fn release_capacity(&mut self) {
        if self.working.is_empty() && self.working.capacity() > self.shrink_threshold {
            debug!(
                capacity = self.working.capacity(),
                "Releasing working list capacity after burst"
            );
            self.working = VecDeque::with_capacity(DEFAULT_WORKING_CAPACITY);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::EntryType;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Clock that only moves when told to
    pub(crate) struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            })
        }

        pub(crate) fn advance(&self, by: Duration) {
            *self.offset.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock()
        }
    }

    /// Probe that reports every path ready unless it is locked
    #[derive(Default)]
    pub(crate) struct ScriptedProbe {
        locked: Mutex<HashSet<PathBuf>>,
        checks: AtomicUsize,
    }

    impl ScriptedProbe {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn lock(&self, path: &str) {
            self.locked.lock().insert(PathBuf::from(path));
        }

        pub(crate) fn unlock(&self, path: &str) {
            self.locked.lock().remove(Path::new(path));
        }

        /// Readiness checks made so far
        pub(crate) fn checks(&self) -> usize {
            self.checks.load(Ordering::SeqCst)
        }
    }

    impl ReadinessProbe for ScriptedProbe {
        fn is_ready(&self, path: &Path) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            !self.locked.lock().contains(path)
        }
    }

    /// Handlers that record every call as a string
    pub(crate) fn recording_handlers() -> (Handlers, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c, d) = (
            Arc::clone(&log),
            Arc::clone(&log),
            Arc::clone(&log),
            Arc::clone(&log),
        );
        let (e, f, g, h) = (
            Arc::clone(&log),
            Arc::clone(&log),
            Arc::clone(&log),
            Arc::clone(&log),
        );
        let handlers = Handlers::new()
            .on_file_added(move |p| a.lock().push(format!("file-added {}", p.display())))
            .on_file_removed(move |p| b.lock().push(format!("file-removed {}", p.display())))
            .on_file_modified(move |p| c.lock().push(format!("file-modified {}", p.display())))
            .on_file_renamed(move |o, n| {
                d.lock()
                    .push(format!("file-renamed {} {}", o.display(), n.display()))
            })
            .on_folder_added(move |p| e.lock().push(format!("folder-added {}", p.display())))
            .on_folder_removed(move |p| f.lock().push(format!("folder-removed {}", p.display())))
            .on_folder_modified(move |p| {
                g.lock().push(format!("folder-modified {}", p.display()))
            })
            .on_folder_renamed(move |o, n| {
                h.lock()
                    .push(format!("folder-renamed {} {}", o.display(), n.display()))
            });
        (handlers, log)
    }

    struct Harness {
        queue: Arc<EventQueue>,
        clock: Arc<ManualClock>,
        probe: Arc<ScriptedProbe>,
        stats: Arc<WatchStats>,
        log: Arc<Mutex<Vec<String>>>,
        engine: DispatchEngine,
    }

    fn harness(mask: EventKindSet) -> Harness {
        harness_with(mask, WatcherConfig::default(), None)
    }

    fn harness_with(
        mask: EventKindSet,
        config: WatcherConfig,
        custom: Option<Handlers>,
    ) -> Harness {
        let queue = Arc::new(EventQueue::new());
        let clock = ManualClock::new();
        let probe = ScriptedProbe::new();
        let stats = Arc::new(WatchStats::default());
        let (recording, log) = recording_handlers();
        let handlers = custom.unwrap_or(recording);
        let engine = DispatchEngine::new(
            Arc::clone(&queue),
            Arc::new(handlers),
            mask,
            &config,
            CancellationToken::new(),
            Arc::clone(&stats),
        )
        .with_clock(clock.clone())
        .with_probe(probe.clone());
        Harness {
            queue,
            clock,
            probe,
            stats,
            log,
            engine,
        }
    }

    fn calls(h: &Harness) -> Vec<String> {
        h.log.lock().clone()
    }

    #[test]
    fn test_dispatch_preserves_arrival_order() {
        let mut h = harness(EventKind::all());
        h.queue.push_all(vec![
            RawEvent::added(EntryType::Folder, "/w/d"),
            RawEvent::removed(EntryType::File, "/w/x"),
            RawEvent::renamed(EntryType::File, "/w/a", "/w/b"),
        ]);

        assert_eq!(h.engine.drain_once(), Ok(3));
        assert_eq!(
            calls(&h),
            vec![
                "folder-added /w/d".to_string(),
                "file-removed /w/x".to_string(),
                "file-renamed /w/a /w/b".to_string(),
            ]
        );
    }

    #[test]
    fn test_mask_filters_other_kinds() {
        let mut h = harness(EventKind::FileAdded.into());
        h.queue.push_all(vec![
            RawEvent::removed(EntryType::File, "/w/x"),
            RawEvent::modified(EntryType::Folder, "/w/d"),
            RawEvent::renamed(EntryType::File, "/w/a", "/w/b"),
            RawEvent::added(EntryType::File, "/w/n"),
        ]);

        h.engine.drain_once().expect("no panic");
        assert_eq!(calls(&h), vec!["file-added /w/n".to_string()]);
        assert_eq!(h.stats.snapshot().filtered, 3);
    }

    #[test]
    fn test_modify_within_window_is_coalesced() {
        let mut h = harness(EventKind::all());
        h.queue.push(RawEvent::added(EntryType::File, "/w/p"));
        h.engine.drain_once().expect("no panic");

        h.clock.advance(Duration::from_millis(400));
        h.queue.push(RawEvent::modified(EntryType::File, "/w/p"));
        h.engine.drain_once().expect("no panic");

        assert_eq!(calls(&h), vec!["file-added /w/p".to_string()]);
        assert_eq!(h.stats.snapshot().coalesced, 1);
    }

    #[test]
    fn test_modify_after_window_is_dispatched() {
        let mut h = harness(EventKind::all());
        h.queue.push(RawEvent::added(EntryType::File, "/w/p"));
        h.engine.drain_once().expect("no panic");

        h.clock.advance(Duration::from_millis(1000));
        h.queue.push(RawEvent::modified(EntryType::File, "/w/p"));
        h.engine.drain_once().expect("no panic");

        assert_eq!(
            calls(&h),
            vec![
                "file-added /w/p".to_string(),
                "file-modified /w/p".to_string()
            ]
        );
    }

    #[test]
    fn test_coalesce_does_not_rearm_marker() {
        let mut h = harness(EventKind::all());
        h.queue.push(RawEvent::added(EntryType::File, "/w/p"));
        h.engine.drain_once().expect("no panic");

        // Folded, and the marker keeps the original timestamp
        h.clock.advance(Duration::from_millis(900));
        h.queue.push(RawEvent::modified(EntryType::File, "/w/p"));
        h.engine.drain_once().expect("no panic");

        h.clock.advance(Duration::from_millis(200));
        h.queue.push(RawEvent::modified(EntryType::File, "/w/p"));
        h.engine.drain_once().expect("no panic");

        assert_eq!(
            calls(&h),
            vec![
                "file-added /w/p".to_string(),
                "file-modified /w/p".to_string()
            ]
        );
    }

    #[test]
    fn test_unrelated_event_resets_marker() {
        let mut h = harness(EventKind::all());
        h.queue.push_all(vec![
            RawEvent::added(EntryType::File, "/w/p"),
            RawEvent::removed(EntryType::File, "/w/q"),
            RawEvent::modified(EntryType::File, "/w/p"),
        ]);
        h.engine.drain_once().expect("no panic");

        assert_eq!(
            calls(&h),
            vec![
                "file-added /w/p".to_string(),
                "file-removed /w/q".to_string(),
                "file-modified /w/p".to_string(),
            ]
        );
    }

    #[test]
    fn test_locked_file_is_dispatched_exactly_once_when_readable() {
        let mut h = harness(EventKind::all());
        h.probe.lock("/w/big.bin");
        h.queue.push(RawEvent::added(EntryType::File, "/w/big.bin"));

        h.engine.drain_once().expect("no panic");
        h.engine.drain_once().expect("no panic");
        assert!(calls(&h).is_empty());
        assert_eq!(h.engine.deferred(), 1);

        // The retried add must not coalesce with its own marker
        h.clock.advance(Duration::from_millis(100));
        h.probe.unlock("/w/big.bin");
        h.engine.drain_once().expect("no panic");
        h.engine.drain_once().expect("no panic");

        assert_eq!(calls(&h), vec!["file-added /w/big.bin".to_string()]);
        assert_eq!(h.engine.deferred(), 0);
        assert_eq!(h.stats.snapshot().deferred, 2);
    }

    #[test]
    fn test_deferred_events_stay_ahead_of_new_arrivals() {
        let mut h = harness(EventKind::all());
        h.probe.lock("/w/a");
        h.probe.lock("/w/b");
        h.queue.push_all(vec![
            RawEvent::added(EntryType::File, "/w/a"),
            RawEvent::added(EntryType::File, "/w/b"),
        ]);
        h.engine.drain_once().expect("no panic");

        h.probe.unlock("/w/a");
        h.probe.unlock("/w/b");
        h.queue.push(RawEvent::removed(EntryType::File, "/w/c"));
        h.engine.drain_once().expect("no panic");

        assert_eq!(
            calls(&h),
            vec![
                "file-added /w/a".to_string(),
                "file-added /w/b".to_string(),
                "file-removed /w/c".to_string(),
            ]
        );
    }

    #[test]
    fn test_removals_and_folders_skip_readiness_gate() {
        let mut h = harness(EventKind::all());
        h.probe.lock("/w/d");
        h.probe.lock("/w/gone");
        h.queue.push_all(vec![
            RawEvent::added(EntryType::Folder, "/w/d"),
            RawEvent::removed(EntryType::File, "/w/gone"),
        ]);
        h.engine.drain_once().expect("no panic");

        assert_eq!(
            calls(&h),
            vec![
                "folder-added /w/d".to_string(),
                "file-removed /w/gone".to_string()
            ]
        );
    }

    #[test]
    fn test_handler_panic_stops_engine() {
        let handlers = Handlers::new().on_file_added(|p| {
            if p.ends_with("bad") {
                panic!("handler exploded");
            }
        });
        let mut h = harness_with(EventKind::all(), WatcherConfig::default(), Some(handlers));
        h.queue.push_all(vec![
            RawEvent::added(EntryType::File, "/w/good"),
            RawEvent::added(EntryType::File, "/w/bad"),
        ]);

        let exit = h.engine.drain_once().unwrap_err();
        assert_eq!(
            exit,
            DispatchExit::HandlerPanicked {
                kind: EventKind::FileAdded,
                message: "handler exploded".to_string(),
            }
        );
        assert_eq!(h.stats.snapshot().dispatched, 1);
    }

    #[test]
    fn test_capacity_released_after_burst() {
        let config = WatcherConfig::builder().shrink_capacity_threshold(128).build();
        let mut h = harness_with(EventKind::all(), config, None);
        h.queue.push_all(
            (0..1_000).map(|i| RawEvent::removed(EntryType::File, format!("/w/{i}"))),
        );

        h.engine.drain_once().expect("no panic");
        assert_eq!(calls(&h).len(), 1_000);
        assert!(h.engine.working.capacity() < 1_000);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let queue = Arc::new(EventQueue::new());
        let cancel = CancellationToken::new();
        let engine = DispatchEngine::new(
            queue,
            Arc::new(Handlers::new()),
            EventKind::all(),
            &WatcherConfig::builder().drain_interval_ms(10).build(),
            cancel.clone(),
            Arc::new(WatchStats::default()),
        );
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(engine.run(tx));

        rx.await.expect("started");
        cancel.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("exited in time")
            .expect("no panic");
        assert_eq!(exit, DispatchExit::Stopped);
    }

    #[tokio::test]
    async fn test_deferred_events_wait_for_drain_interval() {
        let queue = Arc::new(EventQueue::new());
        let probe = ScriptedProbe::new();
        probe.lock("/w/locked.bin");
        let cancel = CancellationToken::new();
        let engine = DispatchEngine::new(
            Arc::clone(&queue),
            Arc::new(Handlers::new()),
            EventKind::all(),
            &WatcherConfig::builder().drain_interval_ms(300).build(),
            cancel.clone(),
            Arc::new(WatchStats::default()),
        )
        .with_probe(probe.clone());
        queue.push(RawEvent::added(EntryType::File, "/w/locked.bin"));

        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(engine.run(tx));
        rx.await.expect("started");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(probe.checks(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(probe.checks() >= 2);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("exited in time")
            .expect("no panic");
    }
}
