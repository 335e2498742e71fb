//! Process-wide attach/detach lifecycle.
//!
//! Exactly one console subsystem exists per process. `attach` installs the
//! router set over the process's standard streams and quit hooks, then
//! starts the dispatcher and the metrics collector as background workers;
//! `detach` reverses all of it. Both are guarded by one process-wide lock,
//! and both are no-ops when called redundantly. The controller owns its
//! workers through explicit handles; teardown never matches on thread
//! names.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use once_cell::sync::{Lazy, OnceCell};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AttachOptions;
use crate::console::CommandRegistry;
use crate::dispatch::Dispatcher;
use crate::metrics::{self, collector::Collector};
use crate::router::{self, RouterSet};
use crate::session::{SessionRegistry, SessionShared};
use crate::worker::{WorkerHandle, spawn_worker};

pub(crate) const EMBED_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::embed");

const DISPATCHER_WORKER: &str = "periscope-dispatch";
const COLLECTOR_WORKER: &str = "periscope-metrics";

/// How long `detach` waits for each worker before abandoning it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced synchronously by [`attach`].
#[derive(Debug, Error)]
pub enum AttachError {
    /// The host is not loopback and external binding was not opted into.
    #[error(
        "refusing to listen on '{host}': the console channel is unauthenticated; \
         set allow_external_bind to listen on an external interface"
    )]
    ExternalBindRefused {
        /// The refused host.
        host: String,
    },
    /// The OS refused to start a background worker thread.
    #[error("failed to spawn worker '{worker}': {source}")]
    SpawnWorker {
        /// Name of the worker that failed to start.
        worker: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Live subsystem state while attached.
struct Attached {
    dispatcher: WorkerHandle,
    collector: WorkerHandle,
    sessions: Arc<SessionRegistry>,
    bound: Arc<OnceCell<SocketAddr>>,
}

static STATE: Lazy<Mutex<Option<Attached>>> = Lazy::new(|| Mutex::new(None));

/// Attaches the console subsystem with the built-in command set.
///
/// A second attach while already attached is a no-op.
///
/// # Errors
///
/// Fails when the options name a non-loopback host without the external-bind
/// opt-in, or when a background worker cannot be spawned. In both cases
/// nothing is left installed or running.
pub fn attach(options: AttachOptions) -> Result<(), AttachError> {
    attach_with_commands(options, CommandRegistry::builtin())
}

/// Attaches the console subsystem with a caller-assembled command registry.
///
/// # Errors
///
/// See [`attach`].
pub fn attach_with_commands(
    options: AttachOptions,
    commands: CommandRegistry,
) -> Result<(), AttachError> {
    if !options.bind_permitted() {
        return Err(AttachError::ExternalBindRefused {
            host: options.host_str().to_owned(),
        });
    }

    let mut state = STATE.lock().unwrap_or_else(PoisonError::into_inner);
    if state.is_some() {
        debug!(target: EMBED_TARGET, "attach called while already attached");
        return Ok(());
    }
    info!(target: EMBED_TARGET, endpoint = %options, "console attaching");

    let routers = Arc::new(RouterSet::with_process_defaults());
    if !router::install(Arc::clone(&routers)) {
        warn!(target: EMBED_TARGET, "router set already installed, reusing it");
    }

    let sessions = Arc::new(SessionRegistry::new());
    let hub = metrics::global_hub();
    let shared = SessionShared {
        routers,
        commands: Arc::new(commands),
        sessions: Arc::clone(&sessions),
        hub: Arc::clone(&hub),
    };

    let bound = Arc::new(OnceCell::new());
    let dispatcher = Dispatcher::new(
        options.host_str().to_owned(),
        options.port_value(),
        options.poll_interval_value(),
        shared,
        Arc::clone(&bound),
    );
    let dispatcher_handle = match spawn_worker(DISPATCHER_WORKER, move |stop| {
        dispatcher.run(&stop);
    }) {
        Ok(handle) => handle,
        Err(source) => {
            router::uninstall();
            return Err(AttachError::SpawnWorker {
                worker: DISPATCHER_WORKER,
                source,
            });
        }
    };

    let collector = Collector::new(
        hub,
        options.series_capacity_value(),
        options.poll_interval_value(),
    );
    let collector_handle = match spawn_worker(COLLECTOR_WORKER, move |stop| {
        collector.run(&stop);
    }) {
        Ok(handle) => handle,
        Err(source) => {
            dispatcher_handle.stop();
            if !dispatcher_handle.join_within(JOIN_TIMEOUT) {
                warn!(
                    target: EMBED_TARGET,
                    worker = DISPATCHER_WORKER,
                    "worker did not stop within the join timeout"
                );
            }
            router::uninstall();
            return Err(AttachError::SpawnWorker {
                worker: COLLECTOR_WORKER,
                source,
            });
        }
    };

    *state = Some(Attached {
        dispatcher: dispatcher_handle,
        collector: collector_handle,
        sessions,
        bound,
    });
    info!(target: EMBED_TARGET, "console attached");
    Ok(())
}

/// Detaches the console subsystem.
///
/// Stops every live session, signals the background workers, joins each
/// within a bounded timeout (stragglers are logged, never waited on
/// indefinitely), and restores the original streams and quit hooks.
/// Detaching when not attached is a no-op.
pub fn detach() {
    let mut state = STATE.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(attached) = state.take() else {
        debug!(target: EMBED_TARGET, "detach called without an attach");
        return;
    };
    info!(target: EMBED_TARGET, "console detaching");

    attached.sessions.stop_all();
    attached.dispatcher.stop();
    attached.collector.stop();
    for handle in [attached.dispatcher, attached.collector] {
        let worker = handle.name().to_owned();
        if !handle.join_within(JOIN_TIMEOUT) {
            warn!(
                target: EMBED_TARGET,
                worker = %worker,
                "worker did not stop within the join timeout"
            );
        }
    }

    router::uninstall();
    info!(target: EMBED_TARGET, "console detached");
}

/// The address the dispatcher is listening on, once bound.
///
/// `None` while detached, before the dispatcher binds, or when the bind
/// failed.
#[must_use]
pub fn local_addr() -> Option<SocketAddr> {
    STATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .and_then(|attached| attached.bound.get().copied())
}

/// Number of live console sessions. Zero while detached.
#[must_use]
pub fn active_sessions() -> usize {
    STATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map_or(0, |attached| attached.sessions.len())
}

/// Whether the console subsystem is currently attached.
#[must_use]
pub fn is_attached() -> bool {
    STATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}
