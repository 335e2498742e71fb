//! Per-connection console sessions.
//!
//! Each accepted connection gets a session worker on its own thread. The
//! worker installs the connection as the calling thread's route for the
//! standard-stream slots, runs the line-oriented command loop, and always
//! tears back down to the pre-session state: socket shut, routes removed,
//! registry entry gone. Sessions are owned explicitly through the
//! [`SessionRegistry`]; teardown never guesses from thread names.

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::console::{CommandContext, CommandOutcome, CommandRegistry};
use crate::metrics::MetricsHub;
use crate::router::RouterSet;
use crate::router::io::{SessionIo, SessionStream};
use crate::worker::panic_message;

pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Prompt written before every command read.
pub(crate) const PROMPT: &str = "(console) ";

const UNRECOGNIZED: &str = "Command unrecognized.";

pub(crate) type SessionId = u64;

/// Everything a session needs besides its own connection.
#[derive(Clone)]
pub(crate) struct SessionShared {
    pub(crate) routers: Arc<RouterSet>,
    pub(crate) commands: Arc<CommandRegistry>,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) hub: Arc<MetricsHub>,
}

/// Teardown handle to a live session.
pub(crate) struct SessionHandle {
    stream: Arc<TcpStream>,
}

impl SessionHandle {
    pub(crate) fn new(stream: Arc<TcpStream>) -> Self {
        Self { stream }
    }

    /// Best-effort shutdown of the connection in both directions.
    ///
    /// This unblocks the session's otherwise-indefinite line read, so the
    /// worker terminates promptly without a poll interval. An
    /// already-closed connection is a no-op, not an error.
    pub(crate) fn stop(&self) {
        if let Err(error) = self.stream.shutdown(Shutdown::Both) {
            debug!(
                target: SESSION_TARGET,
                error = %error,
                "session connection already shut down"
            );
        }
    }
}

/// Explicit ownership of live sessions, keyed by session id.
pub(crate) struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn insert(&self, id: SessionId, handle: SessionHandle) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle);
    }

    pub(crate) fn remove(&self, id: SessionId) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of live sessions.
    pub(crate) fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Signals every live session to stop. Workers deregister themselves as
    /// they finish.
    pub(crate) fn stop_all(&self) {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in sessions.values() {
            handle.stop();
        }
    }
}

/// One console session over one accepted connection.
pub(crate) struct SessionWorker {
    id: SessionId,
    peer: SocketAddr,
    stream: Arc<TcpStream>,
    shared: SessionShared,
}

impl SessionWorker {
    pub(crate) fn new(
        id: SessionId,
        peer: SocketAddr,
        stream: Arc<TcpStream>,
        shared: SessionShared,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            shared,
        }
    }

    /// Runs the session to completion. Must be called on the session's own
    /// thread: route registration is keyed by the calling thread.
    pub(crate) fn run(self) {
        info!(
            target: SESSION_TARGET,
            session = self.id,
            peer = %self.peer,
            "console session opened"
        );
        self.shared
            .routers
            .register_session_io(&SessionStream::destination(&self.stream));

        match panic::catch_unwind(AssertUnwindSafe(|| self.serve())) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                // Peer resets and broken pipes are a normal way for a
                // session to end.
                debug!(
                    target: SESSION_TARGET,
                    session = self.id,
                    error = %error,
                    "console session ended on I/O error"
                );
            }
            Err(payload) => {
                warn!(
                    target: SESSION_TARGET,
                    session = self.id,
                    panic = %panic_message(payload.as_ref()),
                    "console session panicked"
                );
            }
        }

        self.cleanup();
    }

    fn serve(&self) -> io::Result<()> {
        let mut io = SessionIo::for_set(&self.shared.routers);
        io.write_line(&banner());
        io.write_str(PROMPT);

        let mut line = String::new();
        loop {
            line.clear();
            if io.read_line(&mut line)? == 0 {
                // EOF is an exit request.
                return Ok(());
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                io.write_str(PROMPT);
                continue;
            }
            let (name, remainder) = split_command(trimmed);
            let Some(command) = self.shared.commands.get(name) else {
                io.write_line(UNRECOGNIZED);
                io.write_str(PROMPT);
                continue;
            };
            let mut ctx = CommandContext::new(
                &mut io,
                &self.shared.commands,
                &self.shared.routers,
                &self.shared.hub,
            );
            match command.execute(&mut ctx, remainder) {
                Ok(CommandOutcome::Terminate) => return Ok(()),
                Ok(CommandOutcome::Continue) => {}
                Err(error) => {
                    warn!(
                        target: SESSION_TARGET,
                        session = self.id,
                        command = name,
                        error = %error,
                        "command failed"
                    );
                    io.write_line(&format!("error: {error}"));
                }
            }
            io.write_str(PROMPT);
        }
    }

    /// Always executed, whatever ended the session.
    fn cleanup(&self) {
        let mut io = SessionIo::for_set(&self.shared.routers);
        io.write_line("Disconnecting...");
        if let Err(error) = self.stream.shutdown(Shutdown::Both) {
            debug!(
                target: SESSION_TARGET,
                session = self.id,
                error = %error,
                "session connection already shut down"
            );
        }
        self.shared.routers.unregister_session_io();
        self.shared.sessions.remove(self.id);
        info!(
            target: SESSION_TARGET,
            session = self.id,
            peer = %self.peer,
            "console session closed"
        );
    }
}

fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((name, remainder)) => (name, remainder.trim_start()),
        None => (line, ""),
    }
}

fn banner() -> String {
    format!(
        "Welcome to the periscope console. Type 'help' at any point for a list \
         of available commands.\nRunning in PID: {} Name: {}",
        std::process::id(),
        program_name()
    )
}

fn program_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "unknown".to_owned())
}
