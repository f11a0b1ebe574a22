//! Fixed-period snapshot poller.
//!
//! The timer thread dispatches one fetch immediately and then one per period.
//! Fetches run on short-lived worker threads so a slow backend never delays the
//! next tick; requests may therefore overlap and complete out of order. Every
//! dispatch is stamped with a [`SequenceClock`] value so the consumer can drop
//! completions older than what it already applied.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Sender, bounded, select, tick};
use tracing::{debug, info, warn};

use crate::client::SnapshotSource;
use crate::types::BackendSnapshot;

/// Period between two poll dispatches. Not configurable.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Monotonic sequence shared by poll dispatches and locally applied overrides.
#[derive(Clone, Debug, Default)]
pub struct SequenceClock(Arc<AtomicU64>);

impl SequenceClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number. The first call returns 1.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last value handed out, 0 when nothing has been allocated yet.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared cancellation scope for the timer and its in-flight requests.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Completion of one dispatched poll.
#[derive(Clone, Debug)]
pub enum PollEvent {
    Snapshot {
        seq: u64,
        elapsed: Duration,
        snapshot: BackendSnapshot,
    },
    Failed {
        seq: u64,
        elapsed: Duration,
        kind: &'static str,
        message: String,
    },
}

impl PollEvent {
    pub fn seq(&self) -> u64 {
        match self {
            PollEvent::Snapshot { seq, .. } | PollEvent::Failed { seq, .. } => *seq,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollEvent::Snapshot { elapsed, .. } | PollEvent::Failed { elapsed, .. } => *elapsed,
        }
    }
}

/// Run a single fetch stamped with a fresh sequence number.
pub fn poll_once<S: SnapshotSource + ?Sized>(source: &S, clock: &SequenceClock) -> PollEvent {
    let seq = clock.next();
    run_fetch(source, seq)
}

fn run_fetch<S: SnapshotSource + ?Sized>(source: &S, seq: u64) -> PollEvent {
    let started = Instant::now();
    match source.fetch_snapshot() {
        Ok(snapshot) => PollEvent::Snapshot {
            seq,
            elapsed: started.elapsed(),
            snapshot,
        },
        Err(err) => PollEvent::Failed {
            seq,
            elapsed: started.elapsed(),
            kind: err.kind(),
            message: err.message(),
        },
    }
}

/// Handle for the running poll timer.
pub struct Poller {
    token: CancellationToken,
    stop: Option<Sender<()>>,
    timer: Option<thread::JoinHandle<()>>,
}

impl Poller {
    /// Start polling `source` every `period`, delivering completions to `events`.
    pub fn spawn<S: SnapshotSource>(
        source: Arc<S>,
        clock: SequenceClock,
        period: Duration,
        events: Sender<PollEvent>,
    ) -> io::Result<Self> {
        let token = CancellationToken::new();
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let timer_token = token.clone();

        let timer = spawn_traced("backend-poll-timer".into(), move || {
            info!("Polling backend every {} ms", period.as_millis());
            let ticker = tick(period);
            dispatch(&source, &clock, &timer_token, &events);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        if timer_token.is_cancelled() {
                            break;
                        }
                        dispatch(&source, &clock, &timer_token, &events);
                    }
                    recv(stop_rx) -> _ => break,
                }
            }
            debug!("poll timer stopped");
        })?;

        Ok(Self {
            token,
            stop: Some(stop_tx),
            timer: Some(timer),
        })
    }

    /// Token shared with every in-flight request of this poller.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the timer and every in-flight request, then wait for the timer
    /// thread. Requests already on the wire finish in the background but their
    /// results are dropped.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        drop(self.stop.take());
        if let Some(handle) = self.timer.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch<S: SnapshotSource>(
    source: &Arc<S>,
    clock: &SequenceClock,
    token: &CancellationToken,
    events: &Sender<PollEvent>,
) {
    let seq = clock.next();
    let source = Arc::clone(source);
    let token = token.clone();
    let events = events.clone();
    let spawned = spawn_traced(format!("backend-poll-{seq}"), move || {
        debug!(seq, "poll dispatched");
        let event = run_fetch(source.as_ref(), seq);
        if token.is_cancelled() {
            debug!(seq, "dropping poll result that completed after cancellation");
            return;
        }
        let _ = events.send(event);
    });
    if let Err(err) = spawned {
        warn!("Failed to spawn poll worker #{seq}: {err}");
    }
}

/// Spawn a named thread that keeps the caller's tracing dispatcher, so poll
/// events reach the same subscriber as the rest of the pipeline.
fn spawn_traced<F>(name: String, f: F) -> io::Result<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name)
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}
