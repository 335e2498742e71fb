//! Runtime metrics: events, the emission API, and the collector.
//!
//! Any thread may record a metric; recording never blocks and never fails
//! for queue-full conditions. Events flow through a bounded queue into the
//! collector, the single writer of the counter and series stores. Counter
//! names and series names are disjoint namespaces: an event that would cross
//! the boundary is dropped with a warning rather than corrupting a store.
//!
//! ```text
//! any thread -> emission API -> bounded queue -> collector -> stores
//! ```

pub(crate) mod collector;
mod store;

use std::sync::Arc;

use once_cell::sync::Lazy;
use thiserror::Error;

pub use self::store::MetricsHub;

pub(crate) const METRICS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::metrics");

/// Capacity of the event queue between producers and the collector.
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// An `(x, y)` datapoint in a series.
pub type SeriesPoint = (i64, i64);

/// Mutation applied to a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    /// Adds the amount to the counter, creating it at the amount if absent.
    Increment(i64),
    /// Overwrites the counter with the amount.
    Set(i64),
    /// Subtracts the amount, creating the counter at the negated amount if
    /// absent.
    Decrement(i64),
}

/// Payload of a metric event: a counter mutation or a series append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricPayload {
    /// A counter mutation.
    Counter(CounterAction),
    /// A datapoint appended to a series.
    Series(SeriesPoint),
}

/// One recorded metric observation, produced by any thread and consumed
/// only by the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEvent {
    pub(crate) name: String,
    pub(crate) payload: MetricPayload,
}

/// Errors surfaced synchronously by the emission API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    /// The metric name was empty.
    #[error("metric name must not be empty")]
    EmptyName,
}

pub(crate) fn counter_event(name: impl Into<String>, action: CounterAction) -> MetricEvent {
    MetricEvent {
        name: name.into(),
        payload: MetricPayload::Counter(action),
    }
}

pub(crate) fn series_event(name: impl Into<String>, point: SeriesPoint) -> MetricEvent {
    MetricEvent {
        name: name.into(),
        payload: MetricPayload::Series(point),
    }
}

static GLOBAL_HUB: Lazy<Arc<MetricsHub>> =
    Lazy::new(|| Arc::new(MetricsHub::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)));

/// The process-wide hub fed by the free-function emission API.
pub(crate) fn global_hub() -> Arc<MetricsHub> {
    Arc::clone(&GLOBAL_HUB)
}

/// Increments a counter by `amount`.
///
/// # Errors
///
/// Fails synchronously when `name` is empty; the stores are untouched.
pub fn increment(name: impl Into<String>, amount: i64) -> Result<(), MetricError> {
    GLOBAL_HUB.emit(counter_event(name, CounterAction::Increment(amount)))
}

/// Sets a counter to `amount`.
///
/// # Errors
///
/// Fails synchronously when `name` is empty; the stores are untouched.
pub fn set(name: impl Into<String>, amount: i64) -> Result<(), MetricError> {
    GLOBAL_HUB.emit(counter_event(name, CounterAction::Set(amount)))
}

/// Decrements a counter by `amount`.
///
/// # Errors
///
/// Fails synchronously when `name` is empty; the stores are untouched.
pub fn decrement(name: impl Into<String>, amount: i64) -> Result<(), MetricError> {
    GLOBAL_HUB.emit(counter_event(name, CounterAction::Decrement(amount)))
}

/// Appends an `(x, y)` datapoint to a series.
///
/// # Errors
///
/// Fails synchronously when `name` is empty; the stores are untouched.
pub fn record_point(name: impl Into<String>, point: SeriesPoint) -> Result<(), MetricError> {
    GLOBAL_HUB.emit(series_event(name, point))
}

/// Current value of a counter recorded through the emission API.
///
/// Reads are best-effort: a value emitted moments ago may not have been
/// applied by the collector yet.
#[must_use]
pub fn counter(name: &str) -> Option<i64> {
    GLOBAL_HUB.counter(name)
}

/// Snapshot of a series recorded through the emission API, in insertion
/// order.
#[must_use]
pub fn series(name: &str) -> Option<Vec<SeriesPoint>> {
    GLOBAL_HUB.series(name)
}

/// Best-effort resident-set-size probe.
///
/// Returns the process's max RSS as reported by `getrusage` on Unix and `0`
/// on platforms without the probe.
#[cfg(unix)]
#[must_use]
pub fn current_memory_usage() -> i64 {
    use nix::sys::resource::{UsageWho, getrusage};

    match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => i64::from(usage.max_rss()),
        Err(error) => {
            tracing::debug!(target: METRICS_TARGET, error = %error, "getrusage failed");
            0
        }
    }
}

/// Best-effort resident-set-size probe. Unsupported on this platform.
#[cfg(not(unix))]
#[must_use]
pub fn current_memory_usage() -> i64 {
    0
}
