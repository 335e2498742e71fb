//! The metrics collector worker.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info};

use super::{METRICS_TARGET, store::MetricsHub};
use crate::worker::StopFlag;

/// Sole consumer of the event queue and sole writer of the metric stores.
///
/// The collector waits on the queue in bounded slices so a stop request is
/// observed within one poll interval even when no events arrive.
pub(crate) struct Collector {
    hub: Arc<MetricsHub>,
    series_capacity: usize,
    poll_interval: Duration,
}

impl Collector {
    pub(crate) fn new(hub: Arc<MetricsHub>, series_capacity: usize, poll_interval: Duration) -> Self {
        Self {
            hub,
            series_capacity,
            poll_interval,
        }
    }

    /// Drains the queue until stopped.
    pub(crate) fn run(&self, stop: &StopFlag) {
        info!(
            target: METRICS_TARGET,
            series_capacity = self.series_capacity,
            "metrics collector running"
        );
        loop {
            match self.hub.recv_timeout(self.poll_interval) {
                Ok(event) => self.hub.apply(event, self.series_capacity),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!(target: METRICS_TARGET, "metric queue disconnected");
                    return;
                }
            }
            if stop.stop_requested() {
                info!(target: METRICS_TARGET, "metrics collector stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::super::{CounterAction, counter_event};
    use super::*;
    use crate::worker::spawn_worker;

    #[test]
    fn collector_applies_queued_events_and_honours_stop() {
        let hub = Arc::new(MetricsHub::with_queue_capacity(16));
        let collector_hub = Arc::clone(&hub);
        let handle = spawn_worker("test-collector", move |stop| {
            Collector::new(collector_hub, 500, Duration::from_millis(10)).run(&stop);
        })
        .expect("spawn collector");

        hub.emit(counter_event("requests", CounterAction::Increment(2)))
            .expect("emit event");
        hub.emit(counter_event("requests", CounterAction::Increment(3)))
            .expect("emit event");

        let deadline = Instant::now() + Duration::from_secs(2);
        while hub.counter("requests") != Some(5) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hub.counter("requests"), Some(5));

        handle.stop();
        assert!(handle.join_within(Duration::from_secs(2)));
    }
}
