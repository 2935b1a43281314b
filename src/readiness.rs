use crate::status::{Aggregator, InstanceId, Status, StatusEvent};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Gate in front of the aggregator that withholds everything but `Starting`
/// until the host reports readiness, so the first visible aggregate reflects
/// every component having registered.
pub struct ReadinessBuffer {
    aggregator: Aggregator,
    /// Queued events while buffering; None once ready
    pending: Mutex<Option<Vec<(InstanceId, StatusEvent)>>>,
}

impl ReadinessBuffer {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            pending: Mutex::new(Some(Vec::new())),
        }
    }

    /// Commit or queue an event depending on readiness
    pub fn record(&self, instance: &InstanceId, event: StatusEvent) {
        let mut pending = self.pending.lock();
        match pending.as_mut() {
            Some(queue) if event.status() != Status::Starting => {
                debug!("Buffering {} from {} until ready", event.status(), instance);
                queue.push((instance.clone(), event));
            }
            // Committing under the lock keeps pass-through events ordered
            // after a concurrent flush.
            _ => self.aggregator.record_status(instance, event),
        }
    }

    /// Flush queued events in arrival order and stop buffering. Later calls
    /// have no effect.
    pub fn ready(&self) {
        let mut pending = self.pending.lock();
        let Some(queue) = pending.take() else {
            return;
        };

        info!("Host ready, committing {} buffered status events", queue.len());
        for (instance, event) in queue {
            self.aggregator.record_status(&instance, event);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.pending.lock().is_none()
    }

    /// Number of events waiting for readiness
    pub fn buffered(&self) -> usize {
        self.pending.lock().as_ref().map_or(0, Vec::len)
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }
}
