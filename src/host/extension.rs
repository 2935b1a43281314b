use super::component::{StatusWatcher, Subcomponent};
use super::types::LifecycleState;
use crate::config::HealthCheckConfig;
use crate::error::{HealthError, Result};
use crate::readiness::ReadinessBuffer;
use crate::status::{Aggregator, InstanceId, StatusEvent};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Health check extension: receives component status from the host, keeps the
/// registry, and runs the transports that expose it.
pub struct HealthCheckExtension {
    pub(super) config: HealthCheckConfig,
    pub(super) aggregator: Aggregator,
    pub(super) buffer: ReadinessBuffer,
    pub(super) subcomponents: Vec<Box<dyn Subcomponent>>,
    pub(super) state: Mutex<LifecycleState>,
}

impl HealthCheckExtension {
    /// Create the extension and, when enabled, its HTTP server
    pub fn new(config: HealthCheckConfig) -> Result<Self> {
        let aggregator = Aggregator::with_capacity(config.health.subscription_capacity);
        let extension = Self {
            buffer: ReadinessBuffer::new(aggregator.clone()),
            aggregator,
            config,
            subcomponents: Vec::new(),
            state: Mutex::new(LifecycleState::Created),
        };

        #[cfg(feature = "http")]
        let extension = if extension.config.http.enabled {
            let server = crate::http::HttpServerBuilder::new()
                .config(extension.config.http.clone())
                .aggregator(extension.aggregator.clone())
                .failure_duration(extension.config.health.failure_duration())
                .build()?;
            extension.with_subcomponent(Box::new(server))
        } else {
            extension
        };

        Ok(extension)
    }

    /// Add a subcomponent started after those already registered
    pub fn with_subcomponent(mut self, subcomponent: Box<dyn Subcomponent>) -> Self {
        debug!("Registered subcomponent '{}'", subcomponent.name());
        self.subcomponents.push(subcomponent);
        self
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Start every subcomponent in registration order
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Created {
                return Err(HealthError::system(format!(
                    "Cannot start extension in state {:?}",
                    *state
                )));
            }
            *state = LifecycleState::Running;
        }

        info!("Starting health check extension");
        for subcomponent in &self.subcomponents {
            info!("Starting {} subcomponent", subcomponent.name());
            subcomponent.start().await.map_err(|e| {
                HealthError::system(format!(
                    "Failed to start {} subcomponent: {}",
                    subcomponent.name(),
                    e
                ))
            })?;
        }

        info!("Health check extension started");
        Ok(())
    }

    /// Hand the host's effective configuration to every subcomponent. All are
    /// notified even if one fails; the failures are reported together.
    pub fn notify_config(&self, config: &serde_json::Value) -> Result<()> {
        let failures: Vec<String> = self
            .subcomponents
            .iter()
            .filter_map(|subcomponent| {
                subcomponent
                    .notify_config(config)
                    .err()
                    .map(|e| format!("{}: {}", subcomponent.name(), e))
            })
            .collect();

        if failures.is_empty() {
            debug!("Configuration delivered to {} subcomponents", self.subcomponents.len());
            Ok(())
        } else {
            Err(HealthError::system(format!(
                "Config notification failed: {}",
                failures.join("; ")
            )))
        }
    }

    /// The host finished starting every component; buffered status becomes
    /// visible.
    pub fn ready(&self) {
        self.buffer.ready();
    }

    pub fn is_ready(&self) -> bool {
        self.buffer.is_ready()
    }
}

impl StatusWatcher for HealthCheckExtension {
    fn component_status_changed(&self, instance: &InstanceId, event: StatusEvent) {
        if matches!(
            self.state(),
            LifecycleState::Stopping | LifecycleState::Stopped
        ) {
            debug!("Ignoring {} from {} after shutdown", event.status(), instance);
            return;
        }
        self.buffer.record(instance, event);
    }
}
