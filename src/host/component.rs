use crate::error::Result;
use crate::status::{InstanceId, StatusEvent};
use async_trait::async_trait;

/// Receives status changes from the host's component instances
pub trait StatusWatcher: Send + Sync {
    fn component_status_changed(&self, instance: &InstanceId, event: StatusEvent);
}

/// A service started and stopped together with the health extension
#[async_trait]
pub trait Subcomponent: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;

    /// The host's effective configuration, delivered after it is loaded.
    /// Subcomponents that do not expose it ignore the call.
    fn notify_config(&self, _config: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}
