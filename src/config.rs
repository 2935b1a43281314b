use crate::status::{ComponentId, InstanceId, Kind, PipelineId};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HealthCheckConfig {
    pub health: HealthSettings,
    pub http: HttpConfig,

    /// Pipeline topology reported on by the standalone host
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HealthSettings {
    /// How long a recoverable error may persist before probes see a failure
    #[serde(default = "default_failure_duration_ms")]
    pub failure_duration_ms: u64,

    /// Undelivered aggregates kept per subscription
    #[serde(default = "default_subscription_capacity")]
    pub subscription_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,

    /// IP address to bind to
    #[serde(default = "default_http_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Point-in-time status endpoint
    #[serde(default = "default_status_path")]
    pub status_path: String,

    /// Streaming watch endpoint
    #[serde(default = "default_watch_path")]
    pub watch_path: String,

    /// Serve the host configuration at `config_path`
    #[serde(default)]
    pub config_enabled: bool,

    #[serde(default = "default_config_path")]
    pub config_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub receivers: Vec<String>,
    #[serde(default)]
    pub processors: Vec<String>,
    #[serde(default)]
    pub exporters: Vec<String>,
}

impl PipelineConfig {
    fn components(&self) -> impl Iterator<Item = (Kind, &String)> {
        self.receivers
            .iter()
            .map(|id| (Kind::Receiver, id))
            .chain(self.processors.iter().map(|id| (Kind::Processor, id)))
            .chain(self.exporters.iter().map(|id| (Kind::Exporter, id)))
    }

    fn is_empty(&self) -> bool {
        self.receivers.is_empty() && self.processors.is_empty() && self.exporters.is_empty()
    }
}

impl HealthSettings {
    pub fn failure_duration(&self) -> Duration {
        Duration::from_millis(self.failure_duration_ms)
    }
}

impl HttpConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl HealthCheckConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("pipehealth.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("health.failure_duration_ms", default_failure_duration_ms())?
            .set_default(
                "health.subscription_capacity",
                default_subscription_capacity() as i64,
            )?
            .set_default("http.enabled", default_http_enabled())?
            .set_default("http.ip", default_http_ip())?
            .set_default("http.port", default_http_port() as i64)?
            .set_default("http.status_path", default_status_path())?
            .set_default("http.watch_path", default_watch_path())?
            .set_default("http.config_enabled", false)?
            .set_default("http.config_path", default_config_path())?
            .add_source(File::with_name(&path_str).required(false))
            // e.g. PIPEHEALTH_HTTP__PORT=9090
            .add_source(
                Environment::with_prefix("PIPEHEALTH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: HealthCheckConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.http.enabled {
            return Err(ConfigError::Message(
                "Health check must be configured for HTTP".to_string(),
            ));
        }

        if self.http.ip.trim().is_empty() {
            return Err(ConfigError::Message("HTTP endpoint required".to_string()));
        }

        if self.http.port == 0 {
            return Err(ConfigError::Message(
                "HTTP port must be greater than 0".to_string(),
            ));
        }

        let mut paths = vec![
            ("status_path", &self.http.status_path),
            ("watch_path", &self.http.watch_path),
        ];
        if self.http.config_enabled {
            paths.push(("config_path", &self.http.config_path));
        }

        for (name, path) in &paths {
            if !path.starts_with('/') {
                return Err(ConfigError::Message(format!(
                    "HTTP {} must start with '/': {}",
                    name, path
                )));
            }
        }

        for (i, (name, path)) in paths.iter().enumerate() {
            if let Some((other, _)) = paths[i + 1..].iter().find(|(_, p)| p == path) {
                return Err(ConfigError::Message(format!(
                    "HTTP {} and {} must differ",
                    name, other
                )));
            }
        }

        if self.health.failure_duration_ms == 0 {
            return Err(ConfigError::Message(
                "Failure duration must be greater than 0".to_string(),
            ));
        }

        if self.health.subscription_capacity == 0 {
            return Err(ConfigError::Message(
                "Subscription capacity must be greater than 0".to_string(),
            ));
        }

        for (name, pipeline) in &self.pipelines {
            if pipeline.is_empty() {
                return Err(ConfigError::Message(format!(
                    "Pipeline '{}' has no components",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Component instances for the configured pipelines. A component listed
    /// under the same role in several pipelines is one shared instance.
    pub fn instances(&self) -> Vec<InstanceId> {
        let mut memberships: BTreeMap<(Kind, String), BTreeSet<PipelineId>> = BTreeMap::new();
        for (name, pipeline) in &self.pipelines {
            for (kind, id) in pipeline.components() {
                memberships
                    .entry((kind, id.clone()))
                    .or_default()
                    .insert(PipelineId::new(name.as_str()));
            }
        }

        memberships
            .into_iter()
            .map(|((kind, id), pipelines)| InstanceId::new(ComponentId::new(id), kind, pipelines))
            .collect()
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            health: HealthSettings {
                failure_duration_ms: default_failure_duration_ms(),
                subscription_capacity: default_subscription_capacity(),
            },
            http: HttpConfig {
                enabled: default_http_enabled(),
                ip: default_http_ip(),
                port: default_http_port(),
                status_path: default_status_path(),
                watch_path: default_watch_path(),
                config_enabled: false,
                config_path: default_config_path(),
            },
            pipelines: BTreeMap::new(),
        }
    }
}

// Default value functions
fn default_failure_duration_ms() -> u64 {
    5_000
}
fn default_subscription_capacity() -> usize {
    crate::status::DEFAULT_SUBSCRIPTION_CAPACITY
}

fn default_http_enabled() -> bool {
    true
}
fn default_http_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    13133
}
fn default_status_path() -> String {
    "/status".to_string()
}
fn default_watch_path() -> String {
    "/watch".to_string()
}
fn default_config_path() -> String {
    "/config".to_string()
}
