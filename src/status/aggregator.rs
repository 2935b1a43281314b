use super::details::{CollectorStatusDetails, InstanceStatus, PipelineStatusDetails, RoleBreakdown};
use super::event::{InstanceId, PipelineId, Status, StatusEvent};
use super::subscription::{Mailbox, Scope, Subscription};
use crate::error::{HealthError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Default bound of each subscription's delivery queue
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 16;

/// Registry of the latest status per component instance.
///
/// Aggregates are recomputed from current state on every change and pushed to
/// subscriptions whose scope changed. Cloning yields another handle to the
/// same registry.
#[derive(Clone)]
pub struct Aggregator {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    state: Mutex<RegistryState>,
    capacity: usize,
    stats: AggregatorStats,
}

struct RegistryState {
    statuses: HashMap<InstanceId, StatusEvent>,
    last_notified: HashMap<Scope, StatusEvent>,
    subscriptions: HashMap<Scope, HashMap<u64, Arc<Mailbox>>>,
    next_subscription_id: u64,
    /// System aggregate before any instance has reported
    initial: StatusEvent,
    closed: bool,
}

/// Counters for registry activity
#[derive(Debug, Default)]
pub struct AggregatorStats {
    pub events_recorded: AtomicU64,
    pub late_events: AtomicU64,
    pub notifications: AtomicU64,
    pub overruns: AtomicU64,
}

impl AggregatorStats {
    pub fn snapshot(&self, active_subscriptions: usize) -> AggregatorStatsSnapshot {
        AggregatorStatsSnapshot {
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            late_events: self.late_events.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            active_subscriptions,
        }
    }
}

/// Snapshot of registry counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorStatsSnapshot {
    pub events_recorded: u64,
    pub late_events: u64,
    pub notifications: u64,
    pub overruns: u64,
    pub active_subscriptions: usize,
}

impl RegistryState {
    fn in_scope<'a>(&'a self, scope: &'a Scope) -> impl Iterator<Item = (&'a InstanceId, &'a StatusEvent)> {
        self.statuses.iter().filter(move |(instance, _)| match scope {
            Scope::System => true,
            Scope::Pipeline(pipeline) => instance.in_pipeline(pipeline),
        })
    }

    /// Highest-ranked event in scope, or None if no instance is in scope
    fn aggregate(&self, scope: &Scope) -> Option<StatusEvent> {
        strongest(self.in_scope(scope).map(|(_, event)| event)).cloned()
    }

    fn system_aggregate(&self) -> StatusEvent {
        self.aggregate(&Scope::System)
            .unwrap_or_else(|| self.initial.clone())
    }

    fn pipeline_ids(&self) -> BTreeSet<PipelineId> {
        self.statuses
            .keys()
            .flat_map(|instance| instance.pipelines().iter().cloned())
            .collect()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    /// Create an empty registry with the default subscription capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIPTION_CAPACITY)
    }

    /// Create an empty registry whose subscriptions queue at most `capacity`
    /// undelivered aggregates
    pub fn with_capacity(capacity: usize) -> Self {
        let initial = StatusEvent::new(Status::None);
        let mut last_notified = HashMap::new();
        last_notified.insert(Scope::System, initial.clone());

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState {
                    statuses: HashMap::new(),
                    last_notified,
                    subscriptions: HashMap::new(),
                    next_subscription_id: 0,
                    initial,
                    closed: false,
                }),
                capacity: capacity.max(1),
                stats: AggregatorStats::default(),
            }),
        }
    }

    /// Store the latest event for `instance` and notify subscribers of every
    /// scope whose aggregate changed. Events arriving after `close` are
    /// dropped.
    pub fn record_status(&self, instance: &InstanceId, event: StatusEvent) {
        let stats = &self.shared.stats;
        let mut state = self.shared.state.lock();

        if state.closed {
            stats.late_events.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Discarding {} status from {} received after shutdown",
                event.status(),
                instance
            );
            return;
        }

        trace!("Recording {} for {}", event.status(), instance);
        stats.events_recorded.fetch_add(1, Ordering::Relaxed);

        // An unchanged re-report keeps the stored event and its timestamp
        if state
            .statuses
            .get(instance)
            .is_some_and(|current| current.same_state(&event))
        {
            return;
        }
        state.statuses.insert(instance.clone(), event);

        let scopes = std::iter::once(Scope::System).chain(
            instance
                .pipelines()
                .iter()
                .cloned()
                .map(Scope::Pipeline),
        );

        for scope in scopes {
            let Some(aggregate) = state.aggregate(&scope) else {
                continue;
            };

            let changed = state
                .last_notified
                .get(&scope)
                .map_or(true, |previous| !previous.same_state(&aggregate));
            if !changed {
                continue;
            }

            debug!("Aggregate for {} is now {}", scope, aggregate.status());
            state.last_notified.insert(scope.clone(), aggregate.clone());

            if let Some(subscribers) = state.subscriptions.get(&scope) {
                for (id, mailbox) in subscribers {
                    if mailbox.push(Some(aggregate.clone())) {
                        stats.overruns.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "Subscription {} on {} overran, dropped oldest aggregate",
                            id, scope
                        );
                    }
                    stats.notifications.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Current system aggregate
    pub fn collector_status(&self) -> StatusEvent {
        self.shared.state.lock().system_aggregate()
    }

    /// Current aggregate for one pipeline
    pub fn pipeline_status(&self, pipeline: &str) -> Result<StatusEvent> {
        let scope = Scope::Pipeline(PipelineId::new(pipeline));
        self.shared
            .state
            .lock()
            .aggregate(&scope)
            .ok_or_else(|| HealthError::unknown_pipeline(pipeline))
    }

    /// System aggregate plus the per-instance and per-pipeline breakdown
    pub fn collector_status_detailed(&self) -> CollectorStatusDetails {
        let (aggregate, snapshot) = {
            let state = self.shared.state.lock();
            let snapshot: Vec<InstanceStatus> = state
                .statuses
                .iter()
                .map(|(instance, event)| InstanceStatus {
                    instance: instance.clone(),
                    event: event.clone(),
                })
                .collect();
            (state.system_aggregate(), snapshot)
        };

        let mut by_pipeline: BTreeMap<PipelineId, Vec<InstanceStatus>> = BTreeMap::new();
        for status in &snapshot {
            for pipeline in status.instance.pipelines() {
                by_pipeline
                    .entry(pipeline.clone())
                    .or_default()
                    .push(status.clone());
            }
        }

        let pipelines = by_pipeline
            .into_iter()
            .filter_map(|(pipeline, members)| pipeline_details(pipeline, members))
            .collect();

        CollectorStatusDetails {
            aggregate,
            components: RoleBreakdown::from_instances(snapshot),
            pipelines,
        }
    }

    /// Aggregate and breakdown for one pipeline
    pub fn pipeline_status_detailed(&self, pipeline: &str) -> Result<PipelineStatusDetails> {
        let id = PipelineId::new(pipeline);
        let members: Vec<InstanceStatus> = {
            let state = self.shared.state.lock();
            state
                .statuses
                .iter()
                .filter(|(instance, _)| instance.in_pipeline(&id))
                .map(|(instance, event)| InstanceStatus {
                    instance: instance.clone(),
                    event: event.clone(),
                })
                .collect()
        };

        pipeline_details(id, members).ok_or_else(|| HealthError::unknown_pipeline(pipeline))
    }

    /// Identifiers of every pipeline some instance has declared
    pub fn pipelines(&self) -> BTreeSet<PipelineId> {
        self.shared.state.lock().pipeline_ids()
    }

    /// Subscribe to aggregate changes. An empty name subscribes to the system
    /// aggregate. The subscription is primed with the current aggregate.
    pub fn subscribe(&self, pipeline: &str) -> Result<Subscription> {
        let scope = Scope::from_name(pipeline);
        let mailbox = Arc::new(Mailbox::new(self.shared.capacity));

        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(HealthError::SubscriptionClosed);
        }

        let id = state.next_subscription_id;
        state.next_subscription_id += 1;

        let current = match &scope {
            Scope::System => Some(state.system_aggregate()),
            Scope::Pipeline(_) => state.aggregate(&scope),
        };
        mailbox.push(current);

        state
            .subscriptions
            .entry(scope.clone())
            .or_default()
            .insert(id, Arc::clone(&mailbox));
        drop(state);

        debug!("Subscription {} opened on {}", id, scope);
        Ok(Subscription::new(
            id,
            scope,
            mailbox,
            Arc::downgrade(&self.shared),
        ))
    }

    /// Release a subscription. Anything still queued for it is discarded.
    pub fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        if self.shared.state.lock().closed {
            return Err(HealthError::SubscriptionClosed);
        }
        self.shared
            .remove_subscription(subscription.scope(), subscription.id());
        Ok(())
    }

    /// Close every subscription and reject further records
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;

        let mut closed = 0;
        for (_, subscribers) in state.subscriptions.drain() {
            for (_, mailbox) in subscribers {
                mailbox.close();
                closed += 1;
            }
        }

        info!("Status aggregator closed ({} subscriptions ended)", closed);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of open subscriptions
    pub fn subscription_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .subscriptions
            .values()
            .map(HashMap::len)
            .sum()
    }

    pub fn stats(&self) -> AggregatorStatsSnapshot {
        self.shared.stats.snapshot(self.subscription_count())
    }
}

impl Shared {
    pub(crate) fn remove_subscription(&self, scope: &Scope, id: u64) {
        let mailbox = {
            let mut state = self.state.lock();
            let Some(subscribers) = state.subscriptions.get_mut(scope) else {
                return;
            };
            let mailbox = subscribers.remove(&id);
            if subscribers.is_empty() {
                state.subscriptions.remove(scope);
            }
            mailbox
        };

        if let Some(mailbox) = mailbox {
            mailbox.release();
            debug!("Subscription {} on {} released", id, scope);
        }
    }
}

fn pipeline_details(pipeline: PipelineId, members: Vec<InstanceStatus>) -> Option<PipelineStatusDetails> {
    let aggregate = strongest(members.iter().map(|status| &status.event))?.clone();

    Some(PipelineStatusDetails {
        pipeline,
        aggregate,
        components: RoleBreakdown::from_instances(members),
    })
}

/// Event with the highest aggregation rank
fn strongest<'a, I>(events: I) -> Option<&'a StatusEvent>
where
    I: IntoIterator<Item = &'a StatusEvent>,
{
    events.into_iter().fold(None, |best, event| match best {
        Some(current) if !event.outranks(current) => Some(current),
        _ => Some(event),
    })
}
