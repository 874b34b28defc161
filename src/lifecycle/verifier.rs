//! Post-deploy verification of a freshly created proxy instance.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{HalldyllError, Result};
use crate::runtime::ContainerRuntime;

/// Command that makes nginx parse its rendered configuration.
const CONFIG_CHECK_COMMAND: [&str; 2] = ["nginx", "-t"];

/// Default number of log lines captured.
pub(super) const DEFAULT_LOG_TAIL: u32 = 50;

/// Evidence gathered from a healthy instance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Output of the in-container configuration check.
    pub validation_output: String,
    /// Recent log lines, if they could be fetched.
    pub log_tail: Option<String>,
    /// ID of the running instance, as observed.
    pub running_id: String,
}

/// Verifies that the deployed instance accepts its configuration and runs.
#[derive(Debug)]
pub struct PostDeployVerifier<'a, R: ContainerRuntime + ?Sized> {
    runtime: &'a R,
    log_tail: u32,
    /// Wait before the first check, letting the entrypoint render templates.
    settle: Duration,
}

impl<'a, R: ContainerRuntime + ?Sized> PostDeployVerifier<'a, R> {
    /// Creates a new verifier.
    #[must_use]
    pub const fn new(runtime: &'a R) -> Self {
        Self {
            runtime,
            log_tail: DEFAULT_LOG_TAIL,
            settle: Duration::ZERO,
        }
    }

    /// Sets how long to wait after create before checking.
    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Sets how many log lines are captured.
    #[must_use]
    pub const fn with_log_tail(mut self, lines: u32) -> Self {
        self.log_tail = lines;
        self
    }

    /// Runs the configuration check, captures logs and confirms the instance
    /// is running.
    ///
    /// Logs are captured before the outcome is classified so that every
    /// failure carries them.
    ///
    /// # Errors
    ///
    /// Returns [`HalldyllError::ConfigInvalid`] when the check fails on a
    /// running instance and [`HalldyllError::InstanceNotRunning`] when the
    /// instance is not observed running.
    pub async fn verify(&self, name: &str) -> Result<VerifyOutcome> {
        if !self.settle.is_zero() {
            debug!("Waiting {}ms for '{name}' to settle", self.settle.as_millis());
            tokio::time::sleep(self.settle).await;
        }

        info!("Validating configuration inside '{name}'");
        let command: Vec<String> = CONFIG_CHECK_COMMAND.iter().map(ToString::to_string).collect();
        let check = self.runtime.exec(name, &command).await;

        let log_tail = match self.runtime.logs(name, self.log_tail).await {
            Ok(logs) => Some(logs),
            Err(e) => {
                warn!("Could not capture logs of '{name}': {e}");
                None
            }
        };

        let running = match self.runtime.list_running(name).await {
            Ok(instances) => instances.into_iter().find(|i| i.name == name),
            Err(e) => {
                warn!("Could not list running containers: {e}");
                None
            }
        };

        match (check, running) {
            (Ok(output), Some(instance)) if output.success() => {
                info!("Container '{name}' is running with a valid configuration");
                debug!("Check output: {}", output.combined());
                Ok(VerifyOutcome {
                    validation_output: output.combined(),
                    log_tail,
                    running_id: instance.id,
                })
            }
            (Ok(output), _) if !output.success() => Err(HalldyllError::ConfigInvalid {
                name: name.to_string(),
                output: output.combined(),
                log_tail,
            }),
            (Err(e), Some(_)) => Err(HalldyllError::ConfigInvalid {
                name: name.to_string(),
                output: e.to_string(),
                log_tail,
            }),
            (_, _) => Err(HalldyllError::InstanceNotRunning {
                name: name.to_string(),
                log_tail,
            }),
        }
    }
}
