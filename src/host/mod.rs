mod component;
mod extension;
mod runtime;
mod shutdown;
mod types;

#[cfg(test)]
mod tests;

pub use component::{StatusWatcher, Subcomponent};
pub use extension::HealthCheckExtension;
pub use runtime::wait_for_signal;
pub use types::{LifecycleState, ShutdownReason};
