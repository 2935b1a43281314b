use super::component::Subcomponent;
use super::extension::HealthCheckExtension;
use super::types::LifecycleState;
use crate::error::{HealthError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const SUBCOMPONENT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl HealthCheckExtension {
    /// Close the registry and stop subcomponents in reverse start order. Every
    /// subcomponent is asked to stop even if an earlier one fails; the failures
    /// are reported together.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if matches!(*state, LifecycleState::Stopping | LifecycleState::Stopped) {
                return Ok(());
            }
            *state = LifecycleState::Stopping;
        }

        info!("Beginning health check extension shutdown");

        // Ends every open watch so transports can drain
        self.aggregator.close();

        let mut failures = Vec::new();
        for subcomponent in self.subcomponents.iter().rev() {
            if let Err(e) = stop_subcomponent(subcomponent.as_ref()).await {
                error!("Error stopping {} subcomponent: {}", subcomponent.name(), e);
                failures.push(format!("{}: {}", subcomponent.name(), e));
            }
        }

        *self.state.lock() = LifecycleState::Stopped;

        if failures.is_empty() {
            info!("Health check extension shutdown complete");
            Ok(())
        } else {
            Err(HealthError::system(format!(
                "Shutdown failed: {}",
                failures.join("; ")
            )))
        }
    }
}

async fn stop_subcomponent(subcomponent: &dyn Subcomponent) -> Result<()> {
    info!("Stopping {} subcomponent", subcomponent.name());

    match timeout(SUBCOMPONENT_STOP_TIMEOUT, subcomponent.shutdown()).await {
        Ok(Ok(())) => {
            info!("{} subcomponent stopped", subcomponent.name());
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(HealthError::system(format!(
            "{} subcomponent stop timeout",
            subcomponent.name()
        ))),
    }
}
