//! An embeddable diagnostic console and metrics pipeline.
//!
//! `periscope` lets an operator attach a live, line-oriented console to a
//! running process over a TCP socket, issue diagnostic commands, and record
//! and inspect lightweight runtime metrics without restarting the process.
//!
//! Calling [`attach`] installs a per-session stream router over the
//! process's standard streams and quit hooks, then starts two background
//! workers: a dispatcher that accepts connections and spawns one session
//! worker per client, and a metrics collector that drains a bounded event
//! queue into a single-writer store. [`detach`] stops every worker
//! cooperatively, joins them within a bounded timeout, and restores the
//! original hooks.
//!
//! ```rust,ignore
//! periscope::attach(periscope::AttachOptions::new())?;
//!
//! periscope::increment("requests", 1)?;
//! periscope::record_point("latency", (1, 42))?;
//!
//! // ... later, `telnet localhost 10000` and type `stats` ...
//!
//! periscope::detach();
//! ```
//!
//! Metric emission never blocks and never fails the caller for queue-full
//! conditions; the console channel is unauthenticated and therefore bound
//! to loopback unless explicitly overridden.

pub mod config;
pub mod console;
mod dispatch;
mod embed;
pub mod metrics;
pub mod router;
mod session;
mod worker;

pub use config::AttachOptions;
pub use embed::{
    AttachError, active_sessions, attach, attach_with_commands, detach, is_attached, local_addr,
};
pub use metrics::{
    MetricError, current_memory_usage, decrement, increment, record_point, set,
};
pub use worker::StopFlag;
