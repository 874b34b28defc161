//! Container runtime integration module.
//!
//! This module provides everything the orchestrator needs from the container
//! runtime: the narrow command interface, its Docker CLI implementation, the
//! data types it reports, and the optional HTTP probe of a deployed proxy.

mod client;
mod health;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{ContainerRuntime, DockerCli, run_args};
pub use health::{HealthChecker, HealthStatus};
pub use types::{
    ContainerInstance, ExecOutput, InstanceState, LABEL_MANAGED, LABEL_TARGET_HASH, Mount,
    PortBinding, RestartPolicy, RunSpec,
};
