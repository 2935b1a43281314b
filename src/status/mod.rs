mod aggregator;
mod details;
mod event;
mod subscription;

pub use aggregator::{Aggregator, AggregatorStats, AggregatorStatsSnapshot, DEFAULT_SUBSCRIPTION_CAPACITY};
pub use details::{CollectorStatusDetails, InstanceStatus, PipelineStatusDetails, RoleBreakdown};
pub use event::{ComponentId, InstanceId, Kind, PipelineId, Status, StatusEvent};
pub use subscription::{Scope, Subscription};
