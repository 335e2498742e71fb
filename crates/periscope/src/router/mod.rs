//! Per-session routing of shared I/O and control-flow slots.
//!
//! A [`Router`] wraps one "slot" of process-wide behaviour (a standard
//! stream, or the quit/exit hook) and lets the session running on the
//! calling thread transparently reroute that slot to its own destination.
//! Threads with no binding fall through to the slot's original destination,
//! so concurrent sessions never observe each other's routes and the rest of
//! the process is unaffected.
//!
//! The full set of slots lives in a [`RouterSet`], installed process-wide at
//! attach and removed at detach.

pub mod io;
pub mod quit;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;
use tracing::debug;

use self::io::{IoDestination, IoSlot};
use self::quit::QuitHook;

pub(crate) const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// One routable slot: an original destination plus per-session overrides
/// keyed by the session thread's identity.
///
/// The original is set once at construction and immutable thereafter. At most
/// one route exists per session per slot; registering again replaces the
/// calling session's previous binding.
pub struct Router<T> {
    slot: &'static str,
    original: T,
    routes: RwLock<HashMap<ThreadId, T>>,
}

impl<T: Clone> Router<T> {
    /// Wraps `original` as the fallback destination for `slot`.
    pub fn new(slot: &'static str, original: T) -> Self {
        Self {
            slot,
            original,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Binds `route` for the calling session.
    pub fn register(&self, route: T) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread::current().id(), route);
    }

    /// Removes the calling session's binding. Unregistering without a
    /// binding is a no-op, not an error.
    pub fn unregister(&self) {
        let removed = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&thread::current().id());
        if removed.is_none() {
            debug!(
                target: ROUTER_TARGET,
                slot = self.slot,
                "unregister called without a registered route"
            );
        }
    }

    /// Resolves the destination for the calling session: its own binding if
    /// present, the original otherwise.
    pub fn resolve(&self) -> T {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_else(|| self.original.clone())
    }

    /// Whether the calling session currently has a binding.
    #[must_use]
    pub fn has_route(&self) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&thread::current().id())
    }

    /// Number of live bindings across all sessions.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// The installed slots: the three standard streams and the quit/exit hook.
pub struct RouterSet {
    stdout: Router<IoDestination>,
    stderr: Router<IoDestination>,
    stdin: Router<IoDestination>,
    quit: Router<QuitHook>,
}

impl RouterSet {
    /// Builds a set whose originals are the process's real standard streams
    /// and process-exit behaviour.
    #[must_use]
    pub fn with_process_defaults() -> Self {
        Self {
            stdout: Router::new("stdout", IoSlot::Stdout.process_default()),
            stderr: Router::new("stderr", IoSlot::Stderr.process_default()),
            stdin: Router::new("stdin", IoSlot::Stdin.process_default()),
            quit: Router::new("quit", quit::process_exit_hook()),
        }
    }

    /// The router for one I/O slot.
    #[must_use]
    pub fn io_slot(&self, slot: IoSlot) -> &Router<IoDestination> {
        match slot {
            IoSlot::Stdout => &self.stdout,
            IoSlot::Stderr => &self.stderr,
            IoSlot::Stdin => &self.stdin,
        }
    }

    /// The router for the quit/exit control hook.
    #[must_use]
    pub fn quit(&self) -> &Router<QuitHook> {
        &self.quit
    }

    /// Binds all three I/O slots for the calling session.
    pub(crate) fn register_session_io(&self, destination: &IoDestination) {
        self.stdout.register(Arc::clone(destination));
        self.stderr.register(Arc::clone(destination));
        self.stdin.register(Arc::clone(destination));
    }

    /// Removes the calling session's I/O bindings.
    pub(crate) fn unregister_session_io(&self) {
        self.stdout.unregister();
        self.stderr.unregister();
        self.stdin.unregister();
    }
}

static INSTALLED: Lazy<RwLock<Option<Arc<RouterSet>>>> = Lazy::new(|| RwLock::new(None));

/// Installs `set` as the process-wide router set. Returns `false` (leaving
/// the existing installation untouched) when one is already installed.
pub(crate) fn install(set: Arc<RouterSet>) -> bool {
    let mut installed = INSTALLED.write().unwrap_or_else(PoisonError::into_inner);
    if installed.is_some() {
        return false;
    }
    *installed = Some(set);
    true
}

/// Removes and returns the process-wide router set, if any.
pub(crate) fn uninstall() -> Option<Arc<RouterSet>> {
    INSTALLED
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

/// The currently installed router set, if the console is attached.
#[must_use]
pub fn installed() -> Option<Arc<RouterSet>> {
    INSTALLED
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn resolve_falls_back_to_original() {
        let router = Router::new("test", "original");
        assert_eq!(router.resolve(), "original");
        assert!(!router.has_route());
    }

    #[test]
    fn register_overrides_for_calling_thread_only() {
        let router = Arc::new(Router::new("test", "original"));
        router.register("mine");
        assert_eq!(router.resolve(), "mine");

        let remote = Arc::clone(&router);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            tx.send(remote.resolve()).expect("send resolved route");
        });
        assert_eq!(rx.recv().expect("receive resolved route"), "original");
    }

    #[test]
    fn concurrent_sessions_do_not_cross_talk() {
        let router = Arc::new(Router::new("test", 0_u32));
        let mut handles = Vec::new();
        for route in 1..=4_u32 {
            let shared = Arc::clone(&router);
            handles.push(thread::spawn(move || {
                shared.register(route);
                thread::sleep(std::time::Duration::from_millis(10));
                let resolved = shared.resolve();
                shared.unregister();
                resolved == route
            }));
        }
        for handle in handles {
            assert!(handle.join().expect("join session thread"));
        }
        assert_eq!(router.route_count(), 0);
    }

    #[test]
    fn reregistering_replaces_the_binding() {
        let router = Router::new("test", "original");
        router.register("first");
        router.register("second");
        assert_eq!(router.resolve(), "second");
        assert_eq!(router.route_count(), 1);
    }

    #[test]
    fn unregister_without_binding_is_a_no_op() {
        let router = Router::new("test", "original");
        router.unregister();
        assert_eq!(router.resolve(), "original");
    }

    #[test]
    fn installed_set_routes_the_process_facades() {
        use std::io::Write;

        use super::io::test_support::MemoryStream;
        use super::io::{IoDestination, IoSlot};

        let set = Arc::new(RouterSet::with_process_defaults());
        assert!(install(Arc::clone(&set)), "no other install may be live");

        let memory = MemoryStream::with_input(b"queued input\n");
        set.register_session_io(&(Arc::clone(&memory) as IoDestination));

        // Writes and reads issued through the process facades on this
        // thread must land on the registered destination.
        let mut out = io::stdout();
        out.write_all(b"routed output\n").expect("routed write");
        let mut line = String::new();
        io::stdin()
            .read_line(&mut line)
            .expect("routed read");

        set.unregister_session_io();
        uninstall();

        assert_eq!(line, "queued input\n");
        assert!(memory.written_string().contains("routed output"));
        for slot in [IoSlot::Stdin, IoSlot::Stdout, IoSlot::Stderr] {
            assert_eq!(set.io_slot(slot).route_count(), 0);
        }
    }
}
