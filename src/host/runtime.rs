use super::component::StatusWatcher;
use super::extension::HealthCheckExtension;
use super::types::ShutdownReason;
use crate::error::Result;
use crate::status::{Status, StatusEvent};
use std::future::Future;
use tokio::signal;
use tracing::{error, info, warn};

impl HealthCheckExtension {
    /// Run as a standalone host until SIGINT or SIGTERM
    pub async fn run(&self) -> Result<i32> {
        self.run_until(wait_for_signal()).await
    }

    /// Report the configured pipelines through a full lifecycle: starting,
    /// ready and OK until `shutdown` resolves, then stopping and stopped.
    /// Returns the process exit code.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<i32>
    where
        F: Future<Output = Result<ShutdownReason>>,
    {
        let instances = self.config.instances();

        if let Err(e) = self.start().await {
            error!("Failed to start health check extension: {}", e);
            if let Err(shutdown_error) = self.shutdown().await {
                error!("{}", shutdown_error);
            }
            return Err(e);
        }

        match serde_json::to_value(&self.config) {
            Ok(config) => {
                if let Err(e) = self.notify_config(&config) {
                    warn!("{}", e);
                }
            }
            Err(e) => warn!("Failed to serialize configuration: {}", e),
        }

        for instance in &instances {
            self.component_status_changed(instance, StatusEvent::new(Status::Starting));
        }
        self.ready();
        for instance in &instances {
            self.component_status_changed(instance, StatusEvent::new(Status::Ok));
        }

        info!(
            "Health check running for {} instances in {} pipelines",
            instances.len(),
            self.config.pipelines.len()
        );

        let reason = match shutdown.await {
            Ok(reason) => reason,
            Err(e) => {
                error!("Failed waiting for shutdown: {}", e);
                if let Err(shutdown_error) = self.shutdown().await {
                    error!("{}", shutdown_error);
                }
                return Err(e);
            }
        };
        info!("Shutdown initiated: {:?}", reason);

        for instance in &instances {
            self.component_status_changed(instance, StatusEvent::new(Status::Stopping));
        }
        for instance in &instances {
            self.component_status_changed(instance, StatusEvent::new(Status::Stopped));
        }

        let exit_code = match self.shutdown().await {
            Ok(()) => 0,
            Err(e) => {
                error!("{}", e);
                1
            }
        };

        Ok(exit_code)
    }
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM
pub async fn wait_for_signal() -> Result<ShutdownReason> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
                Ok(ShutdownReason::Signal("SIGTERM".to_string()))
            }
            result = signal::ctrl_c() => {
                result?;
                info!("Received SIGINT signal (Ctrl+C)");
                Ok(ShutdownReason::Signal("SIGINT".to_string()))
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received SIGINT signal (Ctrl+C)");
        Ok(ShutdownReason::Signal("SIGINT".to_string()))
    }
}
