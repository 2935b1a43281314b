use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    /// No instance currently declares membership in the pipeline
    #[error("Unknown pipeline: {pipeline}")]
    UnknownPipeline { pipeline: String },

    /// The registry was closed; the subscription will deliver nothing further
    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("Server error: {message}")]
    Server { message: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl HealthError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn server<S: Into<String>>(message: S) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn unknown_pipeline<S: Into<String>>(pipeline: S) -> Self {
        Self::UnknownPipeline {
            pipeline: pipeline.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HealthError>;
