use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::time::Instant;

/// Health states a component instance can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    None,
    Starting,
    #[serde(rename = "OK")]
    Ok,
    RecoverableError,
    PermanentError,
    FatalError,
    Stopping,
    Stopped,
}

impl Status {
    /// Position in the aggregation order. Lifecycle shutdown states rank above
    /// every error so they dominate once shutdown has begun.
    pub fn severity(self) -> u8 {
        match self {
            Status::None => 0,
            Status::Starting => 1,
            Status::Ok => 2,
            Status::RecoverableError => 3,
            Status::PermanentError => 4,
            Status::FatalError => 5,
            Status::Stopped => 6,
            Status::Stopping => 7,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            Status::RecoverableError | Status::PermanentError | Status::FatalError
        )
    }

    /// Intentional shutdown, not failure
    pub fn is_shutdown(self) -> bool {
        matches!(self, Status::Stopping | Status::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::None => "None",
            Status::Starting => "Starting",
            Status::Ok => "OK",
            Status::RecoverableError => "RecoverableError",
            Status::PermanentError => "PermanentError",
            Status::FatalError => "FatalError",
            Status::Stopping => "Stopping",
            Status::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A reported status transition. Immutable once created.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    status: Status,
    seq: u64,
    timestamp: Instant,
    reported_at: SystemTime,
    error: Option<String>,
}

impl StatusEvent {
    /// Create an event without an error payload
    pub fn new(status: Status) -> Self {
        Self {
            status,
            seq: EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp: Instant::now(),
            reported_at: SystemTime::now(),
            error: None,
        }
    }

    /// Create an event carrying an error. The message is kept only for error
    /// statuses.
    pub fn error<S: Into<String>>(status: Status, error: S) -> Self {
        let mut event = Self::new(status);
        if status.is_error() {
            event.error = Some(error.into());
        }
        event
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Monotonic creation time
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Wall-clock creation time
    pub fn reported_at(&self) -> SystemTime {
        self.reported_at
    }

    pub fn err(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether two events describe the same health state, ignoring timestamps
    pub fn same_state(&self, other: &StatusEvent) -> bool {
        self.status == other.status && self.error == other.error
    }

    /// Whether this event outranks `other` when aggregating. Equal severities
    /// resolve to the more recently created event, except `RecoverableError`,
    /// where the oldest wins so the grace window runs from the first failure.
    pub(crate) fn outranks(&self, other: &StatusEvent) -> bool {
        match self.status.severity().cmp(&other.status.severity()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal if self.status == Status::RecoverableError => {
                self.seq < other.seq
            }
            std::cmp::Ordering::Equal => self.seq > other.seq,
        }
    }
}

/// Role of a component instance within its pipelines
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Receiver,
    Processor,
    Exporter,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Receiver => "receiver",
            Kind::Processor => "processor",
            Kind::Exporter => "exporter",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component identifier, e.g. `otlp/in`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline identifier, e.g. `traces` or `metrics/internal`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One running component instance and the pipelines it serves
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId {
    component: ComponentId,
    kind: Kind,
    pipelines: BTreeSet<PipelineId>,
}

impl InstanceId {
    pub fn new<I>(component: ComponentId, kind: Kind, pipelines: I) -> Self
    where
        I: IntoIterator<Item = PipelineId>,
    {
        Self {
            component,
            kind,
            pipelines: pipelines.into_iter().collect(),
        }
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn pipelines(&self) -> &BTreeSet<PipelineId> {
        &self.pipelines
    }

    pub fn in_pipeline(&self, pipeline: &PipelineId) -> bool {
        self.pipelines.contains(pipeline)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        let ordered = [
            Status::None,
            Status::Starting,
            Status::Ok,
            Status::RecoverableError,
            Status::PermanentError,
            Status::FatalError,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].severity() < pair[1].severity());
        }

        // Shutdown states dominate every error
        assert!(Status::Stopped.severity() > Status::FatalError.severity());
        assert!(Status::Stopping.severity() > Status::FatalError.severity());
    }

    #[test]
    fn test_error_payload_only_on_error_statuses() {
        let event = StatusEvent::error(Status::PermanentError, "disk full");
        assert_eq!(event.err(), Some("disk full"));

        let event = StatusEvent::error(Status::Ok, "ignored");
        assert_eq!(event.err(), None);
    }

    #[test]
    fn test_same_state_ignores_timestamp() {
        let a = StatusEvent::new(Status::Ok);
        let b = StatusEvent::new(Status::Ok);
        assert!(a.same_state(&b));

        let c = StatusEvent::error(Status::RecoverableError, "timeout");
        let d = StatusEvent::error(Status::RecoverableError, "refused");
        assert!(!c.same_state(&d));
    }

    #[test]
    fn test_tie_breaks() {
        let first_ok = StatusEvent::new(Status::Ok);
        let second_ok = StatusEvent::new(Status::Ok);
        assert!(second_ok.outranks(&first_ok));
        assert!(!first_ok.outranks(&second_ok));

        // The earliest recoverable error keeps the aggregate
        let first_err = StatusEvent::error(Status::RecoverableError, "timeout");
        let second_err = StatusEvent::error(Status::RecoverableError, "refused");
        assert!(first_err.outranks(&second_err));
        assert!(!second_err.outranks(&first_err));
    }

    #[test]
    fn test_status_serializes_with_wire_names() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&Status::RecoverableError).unwrap(),
            "\"RecoverableError\""
        );
        assert_eq!(serde_json::to_string(&Kind::Exporter).unwrap(), "\"exporter\"");
    }
}
