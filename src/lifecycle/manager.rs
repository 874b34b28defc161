//! Replace-in-place lifecycle of the named proxy container.
//!
//! Teardown of a prior instance is best-effort: each step is attempted and
//! its failure only logged. Pull and create are fatal. A create that collides
//! with a leftover instance fails loudly in the runtime, which is where name
//! exclusivity is actually enforced. A create that fails after the runtime
//! registered the name (a port bind failure, for one) is cleaned up so the
//! name is not left held by a dead container.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{DeploymentTarget, TargetHasher};
use crate::error::{HalldyllError, Result, RuntimeError};
use crate::runtime::{ContainerRuntime, InstanceState, RestartPolicy, RunSpec};

use super::verifier::DEFAULT_LOG_TAIL;

/// Default bound on the graceful stop of a prior instance.
const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

/// Extra time granted to the runtime itself beyond the stop timeout.
const STOP_GRACE_SECS: u64 = 5;

/// What the lifecycle stage did.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LifecycleOutcome {
    /// ID of the newly created container.
    pub container_id: String,
    /// Fingerprint of the deployed target.
    pub target_hash: String,
    /// State of the prior instance before teardown.
    pub prior_state: InstanceState,
    /// ID of the prior instance, if one existed.
    pub prior_id: Option<String>,
    /// Whether the prior instance was built from the same target.
    pub prior_matched_target: Option<bool>,
    /// Teardown steps that failed without aborting the run.
    pub teardown_warnings: Vec<String>,
}

/// Brings exactly one instance named after the target into existence.
#[derive(Debug)]
pub struct LifecycleManager<'a, R: ContainerRuntime + ?Sized> {
    /// Container runtime.
    runtime: &'a R,
    /// Target hasher for the fingerprint label.
    hasher: TargetHasher,
    /// Bound on the graceful stop.
    stop_timeout: Duration,
    /// Optional bound on the image pull.
    pull_timeout: Option<Duration>,
    /// Log lines captured from a failed create.
    log_tail: u32,
}

impl<'a, R: ContainerRuntime + ?Sized> LifecycleManager<'a, R> {
    /// Creates a new lifecycle manager.
    #[must_use]
    pub const fn new(runtime: &'a R) -> Self {
        Self {
            runtime,
            hasher: TargetHasher::new(),
            stop_timeout: Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS),
            pull_timeout: None,
            log_tail: DEFAULT_LOG_TAIL,
        }
    }

    /// Sets the graceful stop timeout.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sets an optional bound on the image pull.
    #[must_use]
    pub const fn with_pull_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Sets how many log lines are captured when the create fails.
    #[must_use]
    pub const fn with_log_tail(mut self, lines: u32) -> Self {
        self.log_tail = lines;
        self
    }

    /// Replaces any instance named after the target with a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`HalldyllError::ImagePullFailed`] or
    /// [`HalldyllError::ContainerCreateFailed`] for the fatal steps, and a
    /// runtime error if the initial lookup fails.
    pub async fn replace(&self, target: &DeploymentTarget) -> Result<LifecycleOutcome> {
        let target_hash = self.hasher.hash_target(target);

        info!("Looking up existing container '{}'", target.name);
        let existing = self.runtime.inspect(&target.name).await?;

        let prior_state = InstanceState::of(existing.as_ref());
        let prior_id = existing.as_ref().map(|i| i.id.clone());
        let prior_matched_target = existing
            .as_ref()
            .map(|i| i.target_hash() == Some(target_hash.as_str()));

        let teardown_warnings = if let Some(instance) = &existing {
            match prior_matched_target {
                Some(true) => info!(
                    "Container '{}' ({prior_state}) already matches the target; recreating",
                    instance.name
                ),
                _ => info!(
                    "Replacing container '{}' ({prior_state}, ID: {})",
                    instance.name, instance.id
                ),
            }
            self.teardown(&target.name).await
        } else {
            debug!("No existing container named '{}'", target.name);
            Vec::new()
        };

        self.pull(&target.image).await?;

        let spec = RunSpec::for_target(target, &target_hash);
        info!(
            "Starting container '{}' on host port {} -> {}",
            target.name,
            target.host_port,
            target.upstream()
        );
        let container_id = match self.runtime.run(&spec).await {
            Ok(id) => id,
            Err(e) => {
                let message = runtime_message(e);
                let log_tail = self.capture_logs(&target.name).await;
                self.discard_failed_create(&target.name, prior_id.as_deref()).await;
                return Err(HalldyllError::ContainerCreateFailed {
                    name: target.name.clone(),
                    message,
                    log_tail,
                });
            }
        };

        info!("Started container '{}' (ID: {container_id})", target.name);

        Ok(LifecycleOutcome {
            container_id,
            target_hash,
            prior_state,
            prior_id,
            prior_matched_target,
            teardown_warnings,
        })
    }

    /// Disables restarts, stops and force-removes a container.
    ///
    /// Every step is attempted; failures are collected, never returned.
    async fn teardown(&self, name: &str) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = self
            .runtime
            .update_restart_policy(name, RestartPolicy::No)
            .await
        {
            warn!("Failed to disable restart policy of '{name}': {e}");
            warnings.push(format!("disable restart policy: {e}"));
        }

        let bound = self.stop_timeout + Duration::from_secs(STOP_GRACE_SECS);
        let stopped = tokio::time::timeout(bound, self.runtime.stop(name, self.stop_timeout))
            .await
            .unwrap_or_else(|_| {
                Err(HalldyllError::Runtime(RuntimeError::Timeout {
                    operation: String::from("stop"),
                    secs: bound.as_secs(),
                }))
            });
        if let Err(e) = stopped {
            warn!("Failed to stop '{name}': {e}");
            warnings.push(format!("stop: {e}"));
        }

        if let Err(e) = self.runtime.remove(name, true).await {
            warn!("Failed to remove '{name}': {e}");
            warnings.push(format!("remove: {e}"));
        }

        warnings
    }

    /// Fetches recent logs of whatever holds the name, if anything.
    async fn capture_logs(&self, name: &str) -> Option<String> {
        match self.runtime.logs(name, self.log_tail).await {
            Ok(logs) => Some(logs),
            Err(e) => {
                debug!("No logs available for '{name}': {e}");
                None
            }
        }
    }

    /// Removes a container left under the name by a failed create.
    ///
    /// Only a stopped instance other than the prior one is removed. A prior
    /// instance that survived teardown stays so the conflict remains visible.
    async fn discard_failed_create(&self, name: &str, prior_id: Option<&str>) {
        let leftover = match self.runtime.inspect(name).await {
            Ok(Some(instance)) => instance,
            Ok(None) => return,
            Err(e) => {
                warn!("Could not inspect '{name}' after failed create: {e}");
                return;
            }
        };

        if Some(leftover.id.as_str()) == prior_id || leftover.is_running() {
            debug!("Leaving '{name}' (ID: {}) in place", leftover.id);
            return;
        }

        info!("Removing half-created container '{name}' (ID: {})", leftover.id);
        if let Err(e) = self.runtime.remove(name, true).await {
            warn!("Failed to remove half-created '{name}': {e}");
        }
    }

    /// Pulls the image, honouring the optional timeout.
    async fn pull(&self, image: &str) -> Result<()> {
        info!("Pulling image {image}");

        let result = match self.pull_timeout {
            Some(limit) => tokio::time::timeout(limit, self.runtime.pull(image))
                .await
                .unwrap_or_else(|_| {
                    Err(HalldyllError::Runtime(RuntimeError::Timeout {
                        operation: String::from("pull"),
                        secs: limit.as_secs(),
                    }))
                }),
            None => self.runtime.pull(image).await,
        };

        result.map_err(|e| HalldyllError::ImagePullFailed {
            image: image.to_string(),
            message: runtime_message(e),
        })
    }
}

/// Extracts the most useful message from a runtime failure.
fn runtime_message(err: HalldyllError) -> String {
    match err {
        HalldyllError::Runtime(RuntimeError::CommandFailed { message, .. }) => message,
        other => other.to_string(),
    }
}
