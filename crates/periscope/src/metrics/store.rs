//! Event queue and metric stores.
//!
//! A [`MetricsHub`] bundles the bounded event queue with the two stores it
//! feeds. The stores have exactly one writer, the collector thread draining
//! the queue, and any number of readers going through a shared read-lock,
//! so readers may observe a value mid-update but never a torn container.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use tracing::warn;

use super::{CounterAction, METRICS_TARGET, MetricError, MetricEvent, MetricPayload, SeriesPoint};

/// Queue plus stores shared between producers, the collector, and readers.
pub struct MetricsHub {
    events_tx: Sender<MetricEvent>,
    events_rx: Receiver<MetricEvent>,
    counters: RwLock<HashMap<String, i64>>,
    series: RwLock<HashMap<String, VecDeque<SeriesPoint>>>,
}

impl MetricsHub {
    /// Builds a hub whose event queue holds at most `capacity` undrained
    /// events. Producers never block: events beyond the capacity are dropped
    /// newest-first with a logged warning.
    #[must_use]
    pub fn with_queue_capacity(capacity: usize) -> Self {
        let (events_tx, events_rx) = bounded(capacity);
        Self {
            events_tx,
            events_rx,
            counters: RwLock::new(HashMap::new()),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Validates and enqueues an event without blocking.
    ///
    /// A full queue is not an error to the producer: the event is dropped
    /// and a warning logged. Validation failures are synchronous and leave
    /// the queue untouched.
    pub fn emit(&self, event: MetricEvent) -> Result<(), MetricError> {
        if event.name.is_empty() {
            return Err(MetricError::EmptyName);
        }
        if let Err(TrySendError::Full(dropped)) = self.events_tx.try_send(event) {
            warn!(
                target: METRICS_TARGET,
                name = %dropped.name,
                "metric queue is full, event silently dropped"
            );
        }
        Ok(())
    }

    /// Waits up to `timeout` for the next queued event.
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<MetricEvent, RecvTimeoutError> {
        self.events_rx.recv_timeout(timeout)
    }

    /// Applies one event to the stores.
    ///
    /// Only the collector thread may call this; it is the single writer both
    /// stores rely on. Events that would move a name across the
    /// counter/series boundary are dropped before any mutation.
    pub(crate) fn apply(&self, event: MetricEvent, series_capacity: usize) {
        match event.payload {
            MetricPayload::Counter(action) => self.apply_counter(&event.name, action),
            MetricPayload::Series(point) => {
                self.apply_series(event.name, point, series_capacity);
            }
        }
    }

    fn apply_counter(&self, name: &str, action: CounterAction) {
        if self.has_series(name) {
            warn!(
                target: METRICS_TARGET,
                name,
                "ignoring counter event for a name already used by a series"
            );
            return;
        }
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        match action {
            CounterAction::Increment(amount) => {
                counters
                    .entry(name.to_owned())
                    .and_modify(|value| *value = value.saturating_add(amount))
                    .or_insert(amount);
            }
            CounterAction::Set(amount) => {
                counters.insert(name.to_owned(), amount);
            }
            CounterAction::Decrement(amount) => {
                counters
                    .entry(name.to_owned())
                    .and_modify(|value| *value = value.saturating_sub(amount))
                    .or_insert_with(|| amount.saturating_neg());
            }
        }
    }

    fn apply_series(&self, name: String, point: SeriesPoint, capacity: usize) {
        if self.counter(&name).is_some() {
            warn!(
                target: METRICS_TARGET,
                name = %name,
                "ignoring series event for a name already used by a counter"
            );
            return;
        }
        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let points = series
            .entry(name)
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        // At capacity the oldest point makes room; a zero capacity admits
        // nothing at all.
        if points.len() >= capacity && points.pop_front().is_none() {
            return;
        }
        points.push_back(point);
    }

    fn has_series(&self, name: &str) -> bool {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Current value of a counter, if recorded.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// Snapshot of a series' datapoints in insertion order, if recorded.
    #[must_use]
    pub fn series(&self, name: &str) -> Option<Vec<SeriesPoint>> {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|points| points.iter().copied().collect())
    }

    /// All counters as `(name, value)`, sorted by name.
    #[must_use]
    pub fn counter_summary(&self) -> Vec<(String, i64)> {
        let mut summary: Vec<_> = self
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        summary.sort();
        summary
    }

    /// All series as `(name, datapoint count)`, sorted by name.
    #[must_use]
    pub fn series_summary(&self) -> Vec<(String, usize)> {
        let mut summary: Vec<_> = self
            .series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, points)| (name.clone(), points.len()))
            .collect();
        summary.sort();
        summary
    }

    /// Drains and applies every queued event. Test and teardown helper; the
    /// running collector normally owns draining.
    #[cfg(test)]
    pub(crate) fn drain(&self, series_capacity: usize) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event, series_capacity);
        }
    }
}
