use super::*;
use crate::config::{HealthCheckConfig, PipelineConfig};
use crate::error::{HealthError, Result};
use crate::status::{ComponentId, InstanceId, Kind, PipelineId, Status, StatusEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

struct RecordingSubcomponent {
    name: String,
    calls: Arc<Mutex<Vec<String>>>,
    fail_start: bool,
    fail_shutdown: bool,
}

impl RecordingSubcomponent {
    fn new(name: &str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::clone(calls),
            fail_start: false,
            fail_shutdown: false,
        }
    }
}

#[async_trait]
impl Subcomponent for RecordingSubcomponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        self.calls.lock().push(format!("start {}", self.name));
        if self.fail_start {
            return Err(HealthError::server("address in use"));
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.calls.lock().push(format!("shutdown {}", self.name));
        if self.fail_shutdown {
            return Err(HealthError::server("stuck connection"));
        }
        Ok(())
    }

    fn notify_config(&self, config: &serde_json::Value) -> Result<()> {
        self.calls
            .lock()
            .push(format!("config {} port={}", self.name, config["http"]["port"]));
        Ok(())
    }
}

fn create_test_config() -> HealthCheckConfig {
    let mut config = HealthCheckConfig::default();
    config.http.enabled = false;
    config.pipelines.insert(
        "traces".to_string(),
        PipelineConfig {
            receivers: vec!["otlp".to_string()],
            processors: vec!["batch".to_string()],
            exporters: vec!["debug".to_string()],
        },
    );
    config
}

fn receiver() -> InstanceId {
    InstanceId::new(
        ComponentId::new("otlp"),
        Kind::Receiver,
        [PipelineId::new("traces")],
    )
}

#[test]
fn test_extension_creation() {
    let extension = HealthCheckExtension::new(create_test_config()).unwrap();

    assert_eq!(extension.state(), LifecycleState::Created);
    assert!(!extension.is_ready());
    assert!(extension.subcomponents.is_empty());
    assert_eq!(extension.aggregator().collector_status().status(), Status::None);
}

#[cfg(feature = "http")]
#[test]
fn test_http_enabled_registers_server() {
    let mut config = create_test_config();
    config.http.enabled = true;

    let extension = HealthCheckExtension::new(config).unwrap();
    assert_eq!(extension.subcomponents.len(), 1);
    assert_eq!(extension.subcomponents[0].name(), "http");
}

#[test]
fn test_status_buffered_until_ready() {
    let extension = HealthCheckExtension::new(create_test_config()).unwrap();
    let watcher: &dyn StatusWatcher = &extension;

    watcher.component_status_changed(&receiver(), StatusEvent::new(Status::Starting));
    watcher.component_status_changed(&receiver(), StatusEvent::new(Status::Ok));
    assert_eq!(
        extension.aggregator().pipeline_status("traces").unwrap().status(),
        Status::Starting
    );

    extension.ready();
    assert!(extension.is_ready());
    assert_eq!(
        extension.aggregator().pipeline_status("traces").unwrap().status(),
        Status::Ok
    );
}

#[tokio::test]
async fn test_start_and_shutdown_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let extension = HealthCheckExtension::new(create_test_config())
        .unwrap()
        .with_subcomponent(Box::new(RecordingSubcomponent::new("first", &calls)))
        .with_subcomponent(Box::new(RecordingSubcomponent::new("second", &calls)));

    extension.start().await.unwrap();
    assert_eq!(extension.state(), LifecycleState::Running);

    extension.shutdown().await.unwrap();
    assert_eq!(extension.state(), LifecycleState::Stopped);
    assert!(extension.aggregator().is_closed());

    assert_eq!(
        *calls.lock(),
        vec!["start first", "start second", "shutdown second", "shutdown first"]
    );
}

#[tokio::test]
async fn test_start_twice_fails() {
    let extension = HealthCheckExtension::new(create_test_config()).unwrap();
    extension.start().await.unwrap();
    assert!(extension.start().await.is_err());
}

#[tokio::test]
async fn test_start_failure_is_reported() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut failing = RecordingSubcomponent::new("http", &calls);
    failing.fail_start = true;

    let extension = HealthCheckExtension::new(create_test_config())
        .unwrap()
        .with_subcomponent(Box::new(failing))
        .with_subcomponent(Box::new(RecordingSubcomponent::new("after", &calls)));

    let err = extension.start().await.unwrap_err();
    assert!(err.to_string().contains("address in use"));
    assert_eq!(*calls.lock(), vec!["start http"]);
}

#[tokio::test]
async fn test_shutdown_aggregates_failures() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut first = RecordingSubcomponent::new("first", &calls);
    first.fail_shutdown = true;
    let mut second = RecordingSubcomponent::new("second", &calls);
    second.fail_shutdown = true;

    let extension = HealthCheckExtension::new(create_test_config())
        .unwrap()
        .with_subcomponent(Box::new(first))
        .with_subcomponent(Box::new(second));

    extension.start().await.unwrap();
    let err = extension.shutdown().await.unwrap_err().to_string();

    assert!(err.contains("first"));
    assert!(err.contains("second"));
    assert_eq!(calls.lock().len(), 4);
    assert_eq!(extension.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_ends_watches() {
    let extension = HealthCheckExtension::new(create_test_config()).unwrap();
    extension.ready();
    extension.component_status_changed(&receiver(), StatusEvent::new(Status::Ok));

    let mut subscription = extension.aggregator().subscribe("traces").unwrap();
    assert!(subscription.recv().await.unwrap().is_some());

    extension.shutdown().await.unwrap();
    extension.shutdown().await.unwrap();

    let end = timeout(Duration::from_millis(100), subscription.recv())
        .await
        .unwrap();
    assert!(matches!(end, Err(HealthError::SubscriptionClosed)));

    // Nothing is recorded once shut down
    extension.component_status_changed(&receiver(), StatusEvent::new(Status::FatalError));
    assert_eq!(extension.aggregator().stats().late_events, 0);
    assert_eq!(
        extension.aggregator().pipeline_status("traces").unwrap().status(),
        Status::Ok
    );
}

#[tokio::test]
async fn test_run_until_reports_full_lifecycle() {
    let extension = Arc::new(HealthCheckExtension::new(create_test_config()).unwrap());
    let mut system = extension.aggregator().subscribe("").unwrap();

    let (stop, stopped) = oneshot::channel();
    let runner = {
        let extension = Arc::clone(&extension);
        tokio::spawn(async move {
            extension
                .run_until(async move {
                    stopped
                        .await
                        .map_err(|_| HealthError::system("stop channel dropped"))
                })
                .await
        })
    };

    let mut seen = Vec::new();
    while seen.last() != Some(&Status::Ok) {
        let event = timeout(Duration::from_secs(1), system.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(event.map_or(Status::None, |e| e.status()));
    }
    assert_eq!(seen, vec![Status::None, Status::Starting, Status::Ok]);

    stop.send(ShutdownReason::Requested).unwrap();
    let exit_code = runner.await.unwrap().unwrap();
    assert_eq!(exit_code, 0);

    let mut tail = Vec::new();
    while let Ok(Some(event)) = system.recv().await {
        tail.push(event.status());
    }
    assert_eq!(tail, vec![Status::Stopping, Status::Stopped]);
    assert_eq!(extension.state(), LifecycleState::Stopped);
}

#[test]
fn test_notify_config_reaches_subcomponents() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let extension = HealthCheckExtension::new(create_test_config())
        .unwrap()
        .with_subcomponent(Box::new(RecordingSubcomponent::new("first", &calls)))
        .with_subcomponent(Box::new(RecordingSubcomponent::new("second", &calls)));

    let config = serde_json::to_value(extension.config()).unwrap();
    extension.notify_config(&config).unwrap();

    assert_eq!(
        *calls.lock(),
        vec!["config first port=13133", "config second port=13133"]
    );
}

#[tokio::test]
async fn test_run_until_shuts_down_after_failed_start() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut failing = RecordingSubcomponent::new("second", &calls);
    failing.fail_start = true;

    let extension = HealthCheckExtension::new(create_test_config())
        .unwrap()
        .with_subcomponent(Box::new(RecordingSubcomponent::new("first", &calls)))
        .with_subcomponent(Box::new(failing));

    let result = extension
        .run_until(async { Ok(ShutdownReason::Requested) })
        .await;

    assert!(result.is_err());
    assert_eq!(extension.state(), LifecycleState::Stopped);
    assert!(extension.aggregator().is_closed());
    assert!(calls.lock().contains(&"shutdown first".to_string()));
}
