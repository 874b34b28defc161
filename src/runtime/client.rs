//! Container runtime interface and its Docker CLI implementation.
//!
//! The orchestrator only ever talks to the runtime through the narrow
//! [`ContainerRuntime`] command set. [`DockerCli`] implements it by shelling
//! out to the `docker` binary and parsing its JSON output.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{HalldyllError, Result, RuntimeError};

use super::types::{ContainerInstance, ExecOutput, InstanceState, RestartPolicy, RunSpec};

/// Default runtime binary.
const DEFAULT_BINARY: &str = "docker";

/// Narrow command set the orchestrator needs from a container runtime.
///
/// The runtime is the sole source of truth about instances; callers never
/// cache what these methods return across a run.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Verifies that the runtime is reachable.
    async fn ping(&self) -> Result<()>;

    /// Looks up a container by exact name. Returns `None` if absent.
    async fn inspect(&self, name: &str) -> Result<Option<ContainerInstance>>;

    /// Lists running containers whose name matches `name` exactly.
    async fn list_running(&self, name: &str) -> Result<Vec<ContainerInstance>>;

    /// Changes the restart policy of an existing container.
    async fn update_restart_policy(&self, name: &str, policy: RestartPolicy) -> Result<()>;

    /// Requests a graceful stop, killing the container after `timeout`.
    async fn stop(&self, name: &str, timeout: Duration) -> Result<()>;

    /// Removes a container.
    async fn remove(&self, name: &str, force: bool) -> Result<()>;

    /// Pulls an image from its registry.
    async fn pull(&self, image: &str) -> Result<()>;

    /// Creates and starts a container. Returns its ID.
    async fn run(&self, spec: &RunSpec) -> Result<String>;

    /// Executes a command inside a running container.
    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput>;

    /// Returns the last `tail` lines of a container's log output.
    async fn logs(&self, name: &str, tail: u32) -> Result<String>;
}

/// Container runtime backed by the Docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    /// Runtime binary (`docker`, or a compatible CLI such as `podman`).
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Creates a client using the `docker` binary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }

    /// Creates a client using a specific binary.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Spawns the runtime binary and waits for it to exit.
    async fn output(&self, args: &[String]) -> Result<Output> {
        trace!("Executing: {} {}", self.binary, args.join(" "));

        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                HalldyllError::Runtime(RuntimeError::Unavailable {
                    message: format!("failed to invoke `{}`: {e}", self.binary),
                })
            })
    }

    /// Runs a command and returns its trimmed stdout, failing on non-zero exit.
    async fn run_checked(&self, operation: &str, args: &[String]) -> Result<String> {
        let output = self.output(args).await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(command_failed(operation, &output))
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<()> {
        let args = vec![
            String::from("version"),
            String::from("--format"),
            String::from("{{.Server.Version}}"),
        ];
        let version = self.run_checked("version", &args).await?;
        debug!("Container runtime server version: {version}");
        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerInstance>> {
        let args = vec![
            String::from("container"),
            String::from("inspect"),
            name.to_string(),
        ];
        let output = self.output(&args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such container") || stderr.contains("No such object") {
                return Ok(None);
            }
            return Err(command_failed("inspect", &output));
        }

        let instances = parse_inspect(&String::from_utf8_lossy(&output.stdout))?;

        // Inspect also resolves ID prefixes; only an exact name counts.
        Ok(instances.into_iter().find(|i| i.name == name))
    }

    async fn list_running(&self, name: &str) -> Result<Vec<ContainerInstance>> {
        let args = vec![
            String::from("ps"),
            String::from("--no-trunc"),
            String::from("--filter"),
            format!("name={name}"),
            String::from("--format"),
            String::from("{{json .}}"),
        ];
        let stdout = self.run_checked("ps", &args).await?;

        let instances = parse_ps(&stdout)?;
        Ok(instances.into_iter().filter(|i| i.name == name).collect())
    }

    async fn update_restart_policy(&self, name: &str, policy: RestartPolicy) -> Result<()> {
        let args = vec![
            String::from("update"),
            String::from("--restart"),
            policy.as_str().to_string(),
            name.to_string(),
        ];
        self.run_checked("update", &args).await.map(|_| ())
    }

    async fn stop(&self, name: &str, timeout: Duration) -> Result<()> {
        let args = vec![
            String::from("stop"),
            String::from("-t"),
            timeout.as_secs().to_string(),
            name.to_string(),
        ];
        self.run_checked("stop", &args).await.map(|_| ())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let mut args = vec![String::from("rm")];
        if force {
            args.push(String::from("-f"));
        }
        args.push(name.to_string());
        self.run_checked("rm", &args).await.map(|_| ())
    }

    async fn pull(&self, image: &str) -> Result<()> {
        let args = vec![
            String::from("pull"),
            String::from("--quiet"),
            image.to_string(),
        ];
        self.run_checked("pull", &args).await.map(|_| ())
    }

    async fn run(&self, spec: &RunSpec) -> Result<String> {
        self.run_checked("run", &run_args(spec)).await
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput> {
        let mut args = vec![String::from("exec"), name.to_string()];
        args.extend(command.iter().cloned());
        let output = self.output(&args).await?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() && stderr.starts_with("Error response from daemon") {
            return Err(command_failed("exec", &output));
        }

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }

    async fn logs(&self, name: &str, tail: u32) -> Result<String> {
        let args = vec![
            String::from("logs"),
            String::from("--tail"),
            tail.to_string(),
            name.to_string(),
        ];
        let output = self.output(&args).await?;

        if !output.status.success() {
            return Err(command_failed("logs", &output));
        }

        // nginx writes most of its log to stderr.
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text.trim_end().to_string())
    }
}

/// Builds the `docker run` argument list for a spec.
#[must_use]
pub fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec![
        String::from("run"),
        String::from("--detach"),
        String::from("--name"),
        spec.name.clone(),
        String::from("--restart"),
        spec.restart.as_str().to_string(),
    ];

    for port in &spec.ports {
        args.push(String::from("--publish"));
        args.push(format!("{}:{}", port.host, port.container));
    }

    for mount in &spec.mounts {
        let mode = if mount.read_only { ":ro" } else { "" };
        args.push(String::from("--volume"));
        args.push(format!("{}:{}{mode}", mount.source.display(), mount.target));
    }

    for (key, value) in &spec.env {
        args.push(String::from("--env"));
        args.push(format!("{key}={value}"));
    }

    for (key, value) in &spec.labels {
        args.push(String::from("--label"));
        args.push(format!("{key}={value}"));
    }

    args.push(spec.image.clone());
    args
}

fn command_failed(operation: &str, output: &Output) -> HalldyllError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    };
    HalldyllError::Runtime(RuntimeError::command_failed(operation, message))
}

/// `docker container inspect` entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    id: String,
    name: String,
    state: InspectState,
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

/// `docker ps --format '{{json .}}'` line.
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

fn parse_inspect(json: &str) -> Result<Vec<ContainerInstance>> {
    let entries: Vec<InspectEntry> = serde_json::from_str(json).map_err(|e| {
        HalldyllError::Runtime(RuntimeError::invalid_response("inspect", e.to_string()))
    })?;

    Ok(entries
        .into_iter()
        .map(|entry| ContainerInstance {
            id: entry.id,
            name: entry.name.trim_start_matches('/').to_string(),
            image: entry.config.image,
            state: if entry.state.running {
                InstanceState::Running
            } else {
                InstanceState::Stopped
            },
            labels: entry.config.labels.unwrap_or_default().into_iter().collect(),
            env: entry
                .config
                .env
                .unwrap_or_default()
                .iter()
                .filter_map(|kv| kv.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
        .collect())
}

fn parse_ps(stdout: &str) -> Result<Vec<ContainerInstance>> {
    let mut instances = Vec::new();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let entry: PsEntry = serde_json::from_str(line).map_err(|e| {
            HalldyllError::Runtime(RuntimeError::invalid_response("ps", e.to_string()))
        })?;

        let labels = parse_label_list(&entry.labels);
        for name in entry.names.split(',') {
            instances.push(ContainerInstance {
                id: entry.id.clone(),
                name: name.trim().to_string(),
                image: entry.image.clone(),
                state: InstanceState::Running,
                labels: labels.clone(),
                env: BTreeMap::new(),
            });
        }
    }

    Ok(instances)
}

fn parse_label_list(labels: &str) -> BTreeMap<String, String> {
    labels
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
