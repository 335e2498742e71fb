//! Cooperatively cancellable background workers.
//!
//! Every long-running thread in the crate is spawned through [`spawn_worker`]
//! and carries a [`StopFlag`]: a one-way flag set at most once per lifecycle
//! by `stop()` and polled by the worker's own loop at a bounded interval.
//! Workers are not restartable. Panics inside a worker body are caught at the
//! thread boundary and logged; they terminate only that worker.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

pub(crate) const WORKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker");

/// How often a parked [`WorkerHandle::join_within`] re-checks thread completion.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Shared cooperative stop signal.
///
/// Setting the flag never interrupts the worker mid-operation; termination
/// happens only at the worker's own polling points.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Creates a flag in the not-requested state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cooperative termination. Idempotent and non-blocking.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether termination has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a background worker spawned via [`spawn_worker`].
pub struct WorkerHandle {
    name: String,
    stop: StopFlag,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// The worker's thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests cooperative termination and returns immediately.
    pub fn stop(&self) {
        self.stop.request_stop();
    }

    /// Returns whether the worker thread has finished running.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Waits up to `timeout` for the worker to finish, then joins it.
    ///
    /// Returns `false` when the worker is still running at the deadline; the
    /// thread is abandoned rather than blocked on, and the straggler is the
    /// caller's to report.
    pub fn join_within(mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
        if handle.join().is_err() {
            // The panic was already logged inside the worker wrapper.
            warn!(target: WORKER_TARGET, worker = %self.name, "worker thread panicked");
        }
        true
    }
}

/// Spawns `body` on a named background thread with a fresh [`StopFlag`].
///
/// The body receives the flag and must poll it at an interval no coarser than
/// its own blocking timeout so that shutdown latency stays bounded. A panic
/// escaping the body is caught, logged, and ends the worker as if stopped;
/// it never propagates to the spawner.
pub(crate) fn spawn_worker<F>(name: impl Into<String>, body: F) -> io::Result<WorkerHandle>
where
    F: FnOnce(StopFlag) + Send + 'static,
{
    let name = name.into();
    let stop = StopFlag::new();
    let worker_stop = stop.clone();
    let worker_name = name.clone();
    let handle = thread::Builder::new().name(name.clone()).spawn(move || {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(worker_stop))) {
            warn!(
                target: WORKER_TARGET,
                worker = %worker_name,
                panic = %panic_message(payload.as_ref()),
                "worker terminated by panic"
            );
        }
    })?;
    Ok(WorkerHandle {
        name,
        stop,
        handle: Some(handle),
    })
}

/// Best-effort extraction of a panic payload's message for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
