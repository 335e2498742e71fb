//! Accepts console connections and spawns session workers.
//!
//! The dispatcher owns the listening socket. It accepts in a non-blocking
//! loop with a bounded backoff nap, so both accept latency and stop latency
//! stay within the configured poll interval. Spawned sessions are
//! independent the moment they start: the dispatcher neither tracks nor
//! joins them. The session registry owns teardown.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{error, info, warn};

use crate::session::{SessionHandle, SessionShared, SessionWorker};
use crate::worker::StopFlag;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Nap between accept attempts when no connection is ready.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
/// Longer nap after an accept error, to avoid spinning on a broken socket.
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Listener worker: binds, accepts, and hands connections to sessions.
pub(crate) struct Dispatcher {
    host: String,
    port: u16,
    poll_interval: Duration,
    shared: SessionShared,
    bound: Arc<OnceCell<SocketAddr>>,
}

impl Dispatcher {
    pub(crate) fn new(
        host: String,
        port: u16,
        poll_interval: Duration,
        shared: SessionShared,
        bound: Arc<OnceCell<SocketAddr>>,
    ) -> Self {
        Self {
            host,
            port,
            poll_interval,
            shared,
            bound,
        }
    }

    /// Runs the accept loop until stopped.
    ///
    /// A bind failure is non-fatal to the embedding process: it is logged
    /// and the dispatcher simply returns, leaving the other workers alone.
    pub(crate) fn run(&self, stop: &StopFlag) {
        let listener = match TcpListener::bind((self.host.as_str(), self.port)) {
            Ok(listener) => listener,
            Err(error) => {
                error!(
                    target: DISPATCH_TARGET,
                    host = %self.host,
                    port = self.port,
                    error = %error,
                    "dispatcher could not bind"
                );
                return;
            }
        };
        if let Err(error) = listener.set_nonblocking(true) {
            error!(
                target: DISPATCH_TARGET,
                error = %error,
                "dispatcher could not enter non-blocking mode"
            );
            return;
        }
        match listener.local_addr() {
            Ok(addr) => {
                let _ = self.bound.set(addr);
                info!(target: DISPATCH_TARGET, addr = %addr, "dispatcher bound and listening");
            }
            Err(error) => {
                info!(
                    target: DISPATCH_TARGET,
                    error = %error,
                    "dispatcher bound and listening"
                );
            }
        }

        let nap = ACCEPT_BACKOFF.min(self.poll_interval);
        let error_nap = ERROR_BACKOFF.min(self.poll_interval).max(nap);
        let mut last_error = None::<io::ErrorKind>;
        while !stop.stop_requested() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    last_error = None;
                    self.spawn_session(stream, peer);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(nap);
                }
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(
                            target: DISPATCH_TARGET,
                            error = %error,
                            "connection accept error"
                        );
                    }
                    last_error = Some(kind);
                    thread::sleep(error_nap);
                }
            }
        }
        // Dropping the listener closes the socket.
        info!(target: DISPATCH_TARGET, "dispatcher stopped");
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        // The listener is non-blocking; the session must not inherit that.
        if let Err(error) = stream.set_nonblocking(false) {
            warn!(
                target: DISPATCH_TARGET,
                peer = %peer,
                error = %error,
                "dropping connection: could not configure stream"
            );
            return;
        }
        let id = self.shared.sessions.next_id();
        let stream = Arc::new(stream);
        self.shared
            .sessions
            .insert(id, SessionHandle::new(Arc::clone(&stream)));

        let worker = SessionWorker::new(id, peer, stream, self.shared.clone());
        let name = format!("periscope-session-{id}-{peer}");
        match thread::Builder::new().name(name).spawn(move || worker.run()) {
            Ok(_handle) => {
                info!(
                    target: DISPATCH_TARGET,
                    session = id,
                    peer = %peer,
                    "session worker started"
                );
            }
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    peer = %peer,
                    error = %error,
                    "failed to spawn session worker"
                );
                self.shared.sessions.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;
    use std::time::Instant;

    use crate::console::CommandRegistry;
    use crate::metrics::MetricsHub;
    use crate::router::RouterSet;
    use crate::session::SessionRegistry;
    use crate::worker::spawn_worker;

    use super::*;

    fn shared_fixture() -> SessionShared {
        SessionShared {
            routers: Arc::new(RouterSet::with_process_defaults()),
            commands: Arc::new(CommandRegistry::builtin()),
            sessions: Arc::new(SessionRegistry::new()),
            hub: Arc::new(MetricsHub::with_queue_capacity(16)),
        }
    }

    fn wait_for_sessions(shared: &SessionShared, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if shared.sessions.len() == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn dispatcher_accepts_connections_and_spawns_sessions() {
        let shared = shared_fixture();
        let bound = Arc::new(OnceCell::new());
        let dispatcher = Dispatcher::new(
            "127.0.0.1".to_owned(),
            0,
            Duration::from_millis(25),
            shared.clone(),
            Arc::clone(&bound),
        );
        let handle = spawn_worker("test-dispatch", move |stop| dispatcher.run(&stop))
            .expect("spawn dispatcher");

        let deadline = Instant::now() + Duration::from_secs(2);
        while bound.get().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let addr = *bound.get().expect("dispatcher bound");

        let first = TcpStream::connect(addr).expect("connect first client");
        let second = TcpStream::connect(addr).expect("connect second client");
        assert!(wait_for_sessions(&shared, 2), "expected two live sessions");

        // Closing one side ends exactly that session.
        drop(first);
        assert!(wait_for_sessions(&shared, 1), "expected one live session");

        drop(second);
        handle.stop();
        assert!(handle.join_within(Duration::from_secs(2)));
        assert!(wait_for_sessions(&shared, 0), "expected no live sessions");
    }

    #[test]
    fn bind_failure_is_non_fatal() {
        let shared = shared_fixture();
        let occupied = TcpListener::bind(("127.0.0.1", 0)).expect("bind blocker");
        let port = occupied.local_addr().expect("blocker address").port();

        let bound = Arc::new(OnceCell::new());
        let dispatcher = Dispatcher::new(
            "127.0.0.1".to_owned(),
            port,
            Duration::from_millis(25),
            shared,
            Arc::clone(&bound),
        );
        let handle = spawn_worker("test-dispatch-collision", move |stop| {
            dispatcher.run(&stop);
        })
        .expect("spawn dispatcher");

        // The worker returns on its own without being stopped.
        assert!(handle.join_within(Duration::from_secs(2)));
        assert!(bound.get().is_none());
    }
}
