//! Binary serving verdicts derived from aggregate status.
//!
//! [`ServingProjector`] is the per-watch state machine: it smooths the raw
//! aggregate stream so a recoverable error only turns into `NotServing` after
//! it has persisted for the grace duration. It holds no timers itself; the
//! pending failure is a deadline the driver sleeps on, which keeps the
//! machine testable without wall-clock waits. [`watch`] drives it from a
//! [`Subscription`].

use crate::status::{Status, StatusEvent, Subscription};
use futures::Stream;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Verdict exposed to health probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
}

impl ServingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServingStatus::Unknown => "UNKNOWN",
            ServingStatus::Serving => "SERVING",
            ServingStatus::NotServing => "NOT_SERVING",
        }
    }

    pub fn is_serving(self) -> bool {
        self == ServingStatus::Serving
    }
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire mapping shared by every transport. A recoverable error still counts as
/// serving here; the grace window is applied by the callers.
pub fn serving_status(status: Status) -> ServingStatus {
    match status {
        Status::Ok | Status::RecoverableError => ServingStatus::Serving,
        Status::None
        | Status::Starting
        | Status::PermanentError
        | Status::FatalError
        | Status::Stopping
        | Status::Stopped => ServingStatus::NotServing,
    }
}

/// Point-in-time verdict for a query: a recoverable error older than `grace`
/// is reported as not serving.
pub fn serving_status_at(event: &StatusEvent, grace: Duration, now: Instant) -> ServingStatus {
    if event.status() == Status::RecoverableError
        && now.saturating_duration_since(event.timestamp()) > grace
    {
        return ServingStatus::NotServing;
    }
    serving_status(event.status())
}

/// Hysteresis state machine for one watch
#[derive(Debug)]
pub struct ServingProjector {
    grace: Duration,
    last_sent: ServingStatus,
    failure_deadline: Option<Instant>,
}

impl ServingProjector {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            last_sent: ServingStatus::Unknown,
            failure_deadline: None,
        }
    }

    /// Last verdict emitted, `Unknown` before the first
    pub fn last_sent(&self) -> ServingStatus {
        self.last_sent
    }

    /// Deadline of the armed failure timer, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.failure_deadline
    }

    /// Process an aggregate observed at `now`. Returns the verdict to send, or
    /// None if it matches the last one sent.
    pub fn observe(&mut self, aggregate: Option<&StatusEvent>, now: Instant) -> Option<ServingStatus> {
        let verdict = match aggregate.map(StatusEvent::status) {
            Some(Status::Ok) => {
                self.failure_deadline = None;
                ServingStatus::Serving
            }
            Some(Status::RecoverableError) => {
                if self.failure_deadline.is_none() {
                    debug!("Recoverable error, failure timer armed for {:?}", self.grace);
                    self.failure_deadline = Some(now + self.grace);
                }
                match self.last_sent {
                    ServingStatus::Unknown => ServingStatus::Serving,
                    previous => previous,
                }
            }
            _ => {
                self.failure_deadline = None;
                ServingStatus::NotServing
            }
        };
        self.emit(verdict)
    }

    /// The failure timer elapsed without recovery
    pub fn expire(&mut self) -> Option<ServingStatus> {
        if self.failure_deadline.take().is_none() {
            return None;
        }
        debug!("Failure timer fired");
        self.emit(ServingStatus::NotServing)
    }

    /// Drop any armed timer
    pub fn cancel(&mut self) {
        self.failure_deadline = None;
    }

    fn emit(&mut self, verdict: ServingStatus) -> Option<ServingStatus> {
        if verdict == self.last_sent {
            return None;
        }
        self.last_sent = verdict;
        Some(verdict)
    }
}

/// Reduce a subscription to a deduplicated stream of verdicts. The stream ends
/// when the registry closes; dropping it releases the subscription and any
/// armed timer.
pub fn watch(mut subscription: Subscription, grace: Duration) -> impl Stream<Item = ServingStatus> {
    async_stream::stream! {
        let mut projector = ServingProjector::new(grace);
        debug!("Watch started on {}", subscription.scope());

        loop {
            let verdict = match projector.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        biased;
                        next = subscription.recv() => match next {
                            Ok(aggregate) => projector.observe(aggregate.as_ref(), Instant::now()),
                            Err(_) => break,
                        },
                        _ = sleep_until(deadline) => projector.expire(),
                    }
                }
                None => match subscription.recv().await {
                    Ok(aggregate) => projector.observe(aggregate.as_ref(), Instant::now()),
                    Err(_) => break,
                },
            };

            if let Some(verdict) = verdict {
                yield verdict;
            }
        }

        projector.cancel();
        debug!("Watch ended on {}", subscription.scope());
    }
}
