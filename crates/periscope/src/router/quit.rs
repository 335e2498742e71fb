//! Routed quit/exit control hook.
//!
//! The quit slot exists so that an interactive sub-session can end without
//! taking the whole process (or the owning console session's socket) with
//! it: the default hook terminates the process, while a session-scoped
//! override turns a quit request into a signal the sub-session driver
//! observes. See [`crate::console::InteractiveCommand`] for the handoff.

use std::process;
use std::sync::Arc;

use tracing::info;

use super::{ROUTER_TARGET, Router};

/// Handler invoked when code running on the slot requests process exit.
pub type QuitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// The process's native quit behaviour.
#[must_use]
pub fn process_exit_hook() -> QuitHook {
    Arc::new(|code| {
        info!(target: ROUTER_TARGET, code, "quit hook terminating process");
        process::exit(code);
    })
}

/// Requests termination through the installed quit slot.
///
/// When the console is attached and the calling session has rerouted the
/// slot, the rerouted hook runs instead of process exit.
pub fn request_quit(code: i32) {
    match super::installed() {
        Some(set) => (set.quit().resolve())(code),
        None => process::exit(code),
    }
}

/// Scoped reroute of the quit slot for the calling session.
///
/// The binding is installed on construction and unconditionally removed on
/// drop, so every exit path out of a sub-session restores the previous quit
/// behaviour.
pub struct QuitRouteGuard<'a> {
    router: &'a Router<QuitHook>,
}

impl<'a> QuitRouteGuard<'a> {
    /// Installs `hook` as the calling session's quit route.
    pub fn install(router: &'a Router<QuitHook>, hook: QuitHook) -> Self {
        router.register(hook);
        Self { router }
    }
}

impl Drop for QuitRouteGuard<'_> {
    fn drop(&mut self) {
        self.router.unregister();
    }
}
