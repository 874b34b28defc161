//! Deployment pipeline.
//!
//! This module runs the stages of a deployment strictly in order:
//! preflight, lifecycle (replace-in-place), verification and an optional
//! HTTP probe. The first failing stage aborts the run. There is no rollback:
//! a failed verification leaves the new instance in place for inspection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{DeploySettings, DeploymentTarget, PreflightReport, PreflightValidator};
use crate::error::{HalldyllError, Result};
use crate::lifecycle::{LifecycleManager, LifecycleOutcome, PostDeployVerifier, VerifyOutcome};
use crate::runtime::{ContainerRuntime, HealthChecker, HealthStatus, InstanceState};

/// A stage of the deployment pipeline.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Configuration bundle checks.
    Preflight,
    /// Teardown of the prior instance, pull and create.
    Lifecycle,
    /// In-container configuration check and running confirmation.
    Verify,
    /// Optional HTTP probe.
    Probe,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Preflight => "preflight",
            Self::Lifecycle => "lifecycle",
            Self::Verify => "verify",
            Self::Probe => "probe",
        };
        write!(f, "{s}")
    }
}

/// Progress notification emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// A stage has started.
    Started(Stage),
    /// A stage finished successfully, with a short summary.
    Succeeded(Stage, String),
    /// A stage reported a non-fatal problem.
    Warned(Stage, String),
    /// A stage failed and the run is aborted.
    Failed(Stage, String),
}

/// Callback receiving pipeline events.
pub type EventListener<'a> = Box<dyn Fn(&StageEvent) + Send + Sync + 'a>;

/// Record of a successful deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    /// Deployment identifier.
    pub id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// The deployed target.
    pub target: DeploymentTarget,
    /// Fingerprint of the target.
    pub target_hash: String,
    /// Preflight findings.
    pub preflight: PreflightReport,
    /// State of the prior instance before teardown.
    pub prior_state: InstanceState,
    /// Non-fatal teardown failures.
    pub teardown_warnings: Vec<String>,
    /// ID of the new instance.
    pub container_id: String,
    /// Output of the in-container configuration check.
    pub validation_output: String,
    /// Recent log lines of the new instance.
    pub log_tail: Option<String>,
    /// Whether the instance was observed running.
    pub running: bool,
    /// Probe result, if a probe is configured.
    pub probe: Option<HealthStatus>,
}

impl DeploymentReport {
    /// Returns the run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Runs the deployment pipeline against a container runtime.
pub struct Reconciler<'a, R: ContainerRuntime + ?Sized> {
    /// Container runtime.
    runtime: &'a R,
    /// Deployment settings.
    settings: &'a DeploySettings,
    /// Optional progress listener.
    listener: Option<EventListener<'a>>,
}

impl<'a, R: ContainerRuntime + ?Sized> Reconciler<'a, R> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(runtime: &'a R, settings: &'a DeploySettings) -> Self {
        Self {
            runtime,
            settings,
            listener: None,
        }
    }

    /// Registers a listener for stage events.
    #[must_use]
    pub fn with_listener(mut self, listener: impl Fn(&StageEvent) + Send + Sync + 'a) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Deploys a target, replacing any instance with the same name.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage. Preflight errors are
    /// raised before any runtime call.
    pub async fn deploy(&self, target: &DeploymentTarget) -> Result<DeploymentReport> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Starting deployment {id}: '{}' on port {} -> {}",
            target.name,
            target.host_port,
            target.upstream()
        );

        let preflight = self.preflight(target)?;
        let outcome = self.lifecycle(target).await?;
        let verified = self.verify(&target.name).await?;
        let probe = self.probe(target).await;

        let report = DeploymentReport {
            id,
            started_at,
            finished_at: Utc::now(),
            target: target.clone(),
            target_hash: outcome.target_hash,
            preflight,
            prior_state: outcome.prior_state,
            teardown_warnings: outcome.teardown_warnings,
            container_id: outcome.container_id,
            validation_output: verified.validation_output,
            log_tail: verified.log_tail,
            running: true,
            probe,
        };

        info!(
            "Deployment {id} finished in {}ms (container {})",
            report.duration_ms(),
            report.container_id
        );
        Ok(report)
    }

    fn preflight(&self, target: &DeploymentTarget) -> Result<PreflightReport> {
        self.emit(&StageEvent::Started(Stage::Preflight));

        let report = PreflightValidator::new()
            .check(&target.bundle())
            .map_err(|e| self.fail(Stage::Preflight, e))?;

        for warning in &report.warnings {
            self.emit(&StageEvent::Warned(Stage::Preflight, warning.clone()));
        }
        self.emit(&StageEvent::Succeeded(
            Stage::Preflight,
            format!(
                "{} and {} template(s)",
                report.config_file.display(),
                report.template_count
            ),
        ));
        Ok(report)
    }

    async fn lifecycle(&self, target: &DeploymentTarget) -> Result<LifecycleOutcome> {
        self.emit(&StageEvent::Started(Stage::Lifecycle));

        if let Err(e) = self.runtime.ping().await {
            return Err(self.fail(Stage::Lifecycle, e));
        }

        let manager = LifecycleManager::new(self.runtime)
            .with_stop_timeout(Duration::from_secs(self.settings.stop_timeout_secs))
            .with_pull_timeout(self.settings.pull_timeout_secs.map(Duration::from_secs))
            .with_log_tail(self.settings.log_tail);

        let outcome = manager
            .replace(target)
            .await
            .map_err(|e| self.fail(Stage::Lifecycle, e))?;

        for warning in &outcome.teardown_warnings {
            self.emit(&StageEvent::Warned(Stage::Lifecycle, warning.clone()));
        }
        self.emit(&StageEvent::Succeeded(
            Stage::Lifecycle,
            format!(
                "replaced {} instance, new container {}",
                outcome.prior_state,
                short_id(&outcome.container_id)
            ),
        ));
        Ok(outcome)
    }

    async fn verify(&self, name: &str) -> Result<VerifyOutcome> {
        self.emit(&StageEvent::Started(Stage::Verify));

        let outcome = PostDeployVerifier::new(self.runtime)
            .with_log_tail(self.settings.log_tail)
            .with_settle(Duration::from_millis(self.settings.settle_millis))
            .verify(name)
            .await
            .map_err(|e| self.fail(Stage::Verify, e))?;

        self.emit(&StageEvent::Succeeded(
            Stage::Verify,
            String::from("configuration valid, instance running"),
        ));
        Ok(outcome)
    }

    /// Runs the optional probe. Its result never fails the deployment.
    async fn probe(&self, target: &DeploymentTarget) -> Option<HealthStatus> {
        let probe = self.settings.probe.as_ref()?;
        self.emit(&StageEvent::Started(Stage::Probe));

        let checker = match HealthChecker::new() {
            Ok(checker) => checker,
            Err(e) => {
                warn!("Skipping probe: {e}");
                self.emit(&StageEvent::Warned(Stage::Probe, e.to_string()));
                return None;
            }
        };

        let url = HealthChecker::url_for(target, probe);
        let status = checker
            .wait_for_healthy(&url, probe.attempts, Duration::from_secs(probe.interval_secs))
            .await;

        if status.healthy {
            self.emit(&StageEvent::Succeeded(Stage::Probe, status.to_string()));
        } else {
            self.emit(&StageEvent::Warned(Stage::Probe, status.to_string()));
        }
        Some(status)
    }

    /// Best-effort log capture for failures that happen after a create.
    fn fail(&self, stage: Stage, err: HalldyllError) -> HalldyllError {
        error!("Stage {stage} failed: {err}");
        self.emit(&StageEvent::Failed(stage, err.to_string()));
        err
    }

    fn emit(&self, event: &StageEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }
}

/// Shortens a container ID for display.
fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::runtime::RestartPolicy;
    use crate::runtime::fake::{FakeRuntime, Op};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        settings: DeploySettings,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let config_file = temp.path().join("nginx.conf");
        let templates_dir = temp.path().join("templates");
        fs::write(&config_file, "events {}\n").expect("Failed to write config");
        fs::create_dir(&templates_dir).expect("Failed to create templates dir");
        fs::write(
            templates_dir.join("default.conf.template"),
            "server { location / { proxy_pass http://${UPSTREAM_HOST}:${UPSTREAM_PORT}; } }\n",
        )
        .expect("Failed to write template");

        let mut settings = DeploySettings::default();
        settings.bundle.config_file = config_file;
        settings.bundle.templates_dir = templates_dir;
        settings.settle_millis = 0;
        Fixture {
            _temp: temp,
            settings,
        }
    }

    fn target_for(
        settings: &DeploySettings,
        name: &str,
        upstream_host: &str,
        upstream_port: u16,
        host_port: u16,
    ) -> DeploymentTarget {
        DeploymentTarget {
            name: name.to_string(),
            image: settings.image.clone(),
            upstream_host: upstream_host.to_string(),
            upstream_port,
            host_port,
            config_file: settings.bundle.config_file.clone(),
            templates_dir: settings.bundle.templates_dir.clone(),
        }
    }

    #[tokio::test]
    async fn test_proxy_scenario() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);

        let report = Reconciler::new(&runtime, &fx.settings)
            .deploy(&target)
            .await
            .expect("deployment should succeed");

        let running = runtime.list_running("proxy-a").await.expect("list should work");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, report.container_id);
        assert!(report.running);
        assert!(report.validation_output.contains("10.0.0.5:9000"));
        assert_eq!(report.prior_state, InstanceState::Absent);
        assert!(report.probe.is_none());
        assert!(report.duration_ms() >= 0);
    }

    #[tokio::test]
    async fn test_missing_templates_makes_no_runtime_calls() {
        let fx = fixture();
        fs::remove_dir_all(&fx.settings.bundle.templates_dir).expect("Failed to remove templates");
        let runtime = FakeRuntime::new();
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);

        let err = Reconciler::new(&runtime, &fx.settings)
            .deploy(&target)
            .await
            .expect_err("preflight must fail");

        match &err {
            HalldyllError::MissingConfig { path, .. } => {
                assert_eq!(path, &fx.settings.bundle.templates_dir);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_pre_mutation());
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_redeploy_is_idempotent() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);
        let reconciler = Reconciler::new(&runtime, &fx.settings);

        let first = reconciler.deploy(&target).await.expect("first run succeeds");
        let after_first = runtime.instance("proxy-a").expect("instance exists");
        let policy_after_first = runtime.restart_policy("proxy-a");

        let second = reconciler.deploy(&target).await.expect("second run succeeds");
        let running = runtime.list_running("proxy-a").await.expect("list should work");

        assert_eq!(second.prior_state, InstanceState::Running);
        assert_eq!(first.target_hash, second.target_hash);
        assert_eq!(running.len(), 1);

        let after_second = &running[0];
        assert_eq!(after_first.id, first.container_id);
        assert_eq!(after_second.id, second.container_id);
        assert_ne!(after_first.id, after_second.id);
        assert_eq!(after_second.image, after_first.image);
        assert_eq!(after_second.env, after_first.env);
        assert_eq!(after_second.labels, after_first.labels);
        assert_eq!(runtime.restart_policy("proxy-a"), policy_after_first);
        assert_eq!(policy_after_first, Some(RestartPolicy::UnlessStopped));
    }

    #[tokio::test]
    async fn test_replacement_changes_observed_config() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        let reconciler = Reconciler::new(&runtime, &fx.settings);

        reconciler
            .deploy(&target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081))
            .await
            .expect("first run succeeds");
        reconciler
            .deploy(&target_for(&fx.settings, "proxy-a", "10.0.0.6", 9001, 8081))
            .await
            .expect("second run succeeds");

        let running = runtime.list_running("proxy-a").await.expect("list should work");
        assert_eq!(running.len(), 1);
        assert_eq!(
            running[0].env.get("UPSTREAM_HOST").map(String::as_str),
            Some("10.0.0.6")
        );
        assert_eq!(
            running[0].env.get("UPSTREAM_PORT").map(String::as_str),
            Some("9001")
        );
    }

    #[tokio::test]
    async fn test_pull_failure_leaves_name_absent() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        let reconciler = Reconciler::new(&runtime, &fx.settings);
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);
        reconciler.deploy(&target).await.expect("first run succeeds");

        runtime.fail(Op::Pull);
        let err = reconciler.deploy(&target).await.expect_err("pull fails");

        assert_eq!(err.exit_code(), 4);
        assert!(runtime.instance("proxy-a").is_none());
    }

    #[tokio::test]
    async fn test_port_conflict_reports_create_failure() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        runtime.occupy_port(8081);
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);

        let err = Reconciler::new(&runtime, &fx.settings)
            .deploy(&target)
            .await
            .expect_err("port is taken");

        assert!(matches!(err, HalldyllError::ContainerCreateFailed { .. }));
        assert_eq!(err.exit_code(), 5);
        assert!(err.log_tail().is_some(), "logs of the half-created instance");
        assert!(runtime.instance("proxy-a").is_none());
    }

    #[tokio::test]
    async fn test_create_conflict_after_failed_teardown_carries_logs() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        let reconciler = Reconciler::new(&runtime, &fx.settings);
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);
        reconciler.deploy(&target).await.expect("first run succeeds");

        runtime.fail(Op::Remove);
        let err = reconciler.deploy(&target).await.expect_err("name still taken");

        assert!(matches!(err, HalldyllError::ContainerCreateFailed { .. }));
        assert!(err.log_tail().is_some());
    }

    #[tokio::test]
    async fn test_instance_exiting_on_start() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        runtime.exit_on_start();
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);

        let err = Reconciler::new(&runtime, &fx.settings)
            .deploy(&target)
            .await
            .expect_err("instance exits");

        assert!(matches!(err, HalldyllError::InstanceNotRunning { .. }));
        assert!(runtime.instance("proxy-a").is_some(), "left in place for inspection");
    }

    #[tokio::test]
    async fn test_rejected_config_is_left_in_place() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        runtime.fail_config_check();
        let target = target_for(&fx.settings, "proxy-a", "", 9000, 8081);

        let err = Reconciler::new(&runtime, &fx.settings)
            .deploy(&target)
            .await
            .expect_err("config check fails");

        assert_eq!(err.exit_code(), 6);
        assert!(err.log_tail().is_some());
        assert!(runtime.instance("proxy-a").is_some_and(|i| i.is_running()));
    }

    #[tokio::test]
    async fn test_runtime_unavailable_stops_before_mutation() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        runtime.fail(Op::Ping);
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);

        let err = Reconciler::new(&runtime, &fx.settings)
            .deploy(&target)
            .await
            .expect_err("runtime is down");

        assert!(matches!(err, HalldyllError::Runtime(_)));
        assert_eq!(runtime.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_interrupted_pull_leaves_gap() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        let reconciler = Reconciler::new(&runtime, &fx.settings);
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);
        reconciler.deploy(&target).await.expect("first run succeeds");

        runtime.hang_pull();
        let interrupted =
            tokio::time::timeout(Duration::from_millis(50), reconciler.deploy(&target)).await;

        assert!(interrupted.is_err(), "pipeline should still be pulling");
        assert!(runtime.instance("proxy-a").is_none());
        assert!(runtime.list_running("proxy-a").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_events_follow_stage_order() {
        let fx = fixture();
        let runtime = FakeRuntime::new();
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 8081);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        Reconciler::new(&runtime, &fx.settings)
            .with_listener(move |event| {
                sink.lock().expect("event lock").push(event.clone());
            })
            .deploy(&target)
            .await
            .expect("deployment should succeed");

        let started: Vec<Stage> = events
            .lock()
            .expect("event lock")
            .iter()
            .filter_map(|e| match e {
                StageEvent::Started(stage) => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![Stage::Preflight, Stage::Lifecycle, Stage::Verify]);
    }

    #[tokio::test]
    async fn test_unhealthy_probe_is_advisory() {
        let mut fx = fixture();
        fx.settings.probe = Some(ProbeConfig {
            path: String::from("/healthz"),
            attempts: 1,
            interval_secs: 0,
        });
        let runtime = FakeRuntime::new();
        // Nothing listens on port 1, the probe cannot succeed.
        let target = target_for(&fx.settings, "proxy-a", "10.0.0.5", 9000, 1);

        let report = Reconciler::new(&runtime, &fx.settings)
            .deploy(&target)
            .await
            .expect("probe failure does not fail the run");

        let probe = report.probe.expect("probe was configured");
        assert!(!probe.healthy);
        assert_eq!(probe.url, "http://127.0.0.1:1/healthz");
    }
}
