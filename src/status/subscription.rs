use super::aggregator::Shared;
use super::event::{PipelineId, StatusEvent};
use crate::error::{HealthError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::trace;

/// What a subscription observes: one pipeline, or the whole system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    System,
    Pipeline(PipelineId),
}

impl Scope {
    /// Empty name selects the system scope
    pub fn from_name(name: &str) -> Self {
        if name.is_empty() {
            Scope::System
        } else {
            Scope::Pipeline(PipelineId::new(name))
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::System => f.write_str("system"),
            Scope::Pipeline(id) => write!(f, "pipeline:{}", id),
        }
    }
}

/// Bounded per-subscription delivery queue. Pushes never block; when full the
/// oldest entry is dropped so the most recent aggregate is always retained.
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
    capacity: usize,
}

#[derive(Default)]
struct MailboxState {
    queue: VecDeque<Option<StatusEvent>>,
    closed: bool,
    released: bool,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue an aggregate. Returns true if an older entry was dropped.
    pub(crate) fn push(&self, aggregate: Option<StatusEvent>) -> bool {
        let overrun = {
            let mut state = self.state.lock();
            if state.closed || state.released {
                return false;
            }
            let overrun = state.queue.len() >= self.capacity;
            if overrun {
                state.queue.pop_front();
            }
            state.queue.push_back(aggregate);
            overrun
        };
        self.notify.notify_one();
        overrun
    }

    /// Registry shutdown: queued entries are still delivered, then the end of
    /// stream is signalled.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Unsubscribe: anything still queued is discarded.
    pub(crate) fn release(&self) {
        {
            let mut state = self.state.lock();
            state.released = true;
            state.queue.clear();
        }
        self.notify.notify_one();
    }

    fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}

/// Handle to a stream of aggregate changes for one scope.
///
/// `None` items mean the scope currently has no aggregate (a pipeline no
/// instance has declared yet). Dropping the handle unsubscribes it.
pub struct Subscription {
    id: u64,
    scope: Scope,
    mailbox: Arc<Mailbox>,
    registry: Weak<Shared>,
}

impl Subscription {
    pub(crate) fn new(id: u64, scope: Scope, mailbox: Arc<Mailbox>, registry: Weak<Shared>) -> Self {
        Self {
            id,
            scope,
            mailbox,
            registry,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Number of notifications waiting to be received
    pub fn pending(&self) -> usize {
        self.mailbox.pending()
    }

    /// Wait for the next aggregate change.
    ///
    /// Fails with `SubscriptionClosed` once the registry has shut down and the
    /// queue is drained, or after the subscription was released.
    pub async fn recv(&mut self) -> Result<Option<StatusEvent>> {
        loop {
            {
                let mut state = self.mailbox.state.lock();
                if state.released {
                    return Err(HealthError::SubscriptionClosed);
                }
                if let Some(aggregate) = state.queue.pop_front() {
                    return Ok(aggregate);
                }
                if state.closed {
                    trace!("Subscription {} on {} reached end of stream", self.id, self.scope);
                    return Err(HealthError::SubscriptionClosed);
                }
            }
            self.mailbox.notify.notified().await;
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.remove_subscription(&self.scope, self.id);
        }
        self.mailbox.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    #[test]
    fn test_scope_from_name() {
        assert_eq!(Scope::from_name(""), Scope::System);
        assert_eq!(
            Scope::from_name("traces"),
            Scope::Pipeline(PipelineId::new("traces"))
        );
    }

    #[test]
    fn test_mailbox_retains_latest_on_overrun() {
        let mailbox = Mailbox::new(2);

        assert!(!mailbox.push(Some(StatusEvent::new(Status::Starting))));
        assert!(!mailbox.push(Some(StatusEvent::new(Status::Ok))));
        assert!(mailbox.push(Some(StatusEvent::new(Status::FatalError))));

        let state = mailbox.state.lock();
        let statuses: Vec<_> = state
            .queue
            .iter()
            .map(|e| e.as_ref().map(|e| e.status()))
            .collect();
        assert_eq!(statuses, vec![Some(Status::Ok), Some(Status::FatalError)]);
    }

    #[test]
    fn test_released_mailbox_discards_pushes() {
        let mailbox = Mailbox::new(4);
        mailbox.push(Some(StatusEvent::new(Status::Ok)));
        mailbox.release();
        mailbox.push(Some(StatusEvent::new(Status::FatalError)));

        assert_eq!(mailbox.pending(), 0);
    }
}
