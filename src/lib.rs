pub mod config;
pub mod error;
pub mod host;
pub mod readiness;
pub mod serving;
pub mod status;

#[cfg(feature = "http")]
pub mod http;

pub use config::{HealthCheckConfig, HealthSettings, HttpConfig, PipelineConfig};
pub use error::{HealthError, Result};
pub use host::{HealthCheckExtension, LifecycleState, ShutdownReason, StatusWatcher, Subcomponent};
pub use readiness::ReadinessBuffer;
pub use serving::{serving_status, serving_status_at, watch, ServingProjector, ServingStatus};
pub use status::{
    Aggregator, CollectorStatusDetails, ComponentId, InstanceId, Kind, PipelineId,
    PipelineStatusDetails, Scope, Status, StatusEvent, Subscription,
};

#[cfg(feature = "http")]
pub use http::{HttpServer, HttpServerBuilder};
