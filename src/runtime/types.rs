//! Container runtime data types.
//!
//! These types describe what the runtime reports about a named container
//! and what the lifecycle manager asks it to create.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{
    CONTAINER_CONFIG_PATH, CONTAINER_PORT, CONTAINER_TEMPLATES_PATH, DeploymentTarget,
};

/// Label marking containers created by this tool.
pub const LABEL_MANAGED: &str = "halldyll.proxy.managed";

/// Label carrying the target fingerprint.
pub const LABEL_TARGET_HASH: &str = "halldyll.proxy.target-hash";

/// Observed state of a named instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// No instance exists under the name.
    #[default]
    Absent,
    /// The instance exists but is not running.
    Stopped,
    /// The instance is running.
    Running,
}

impl InstanceState {
    /// Returns the state for an optional observed instance.
    #[must_use]
    pub fn of(instance: Option<&ContainerInstance>) -> Self {
        instance.map_or(Self::Absent, |i| i.state)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Stopped => "present-stopped",
            Self::Running => "present-running",
        };
        write!(f, "{s}")
    }
}

/// The runtime's view of a named container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerInstance {
    /// Container ID.
    pub id: String,
    /// Container name (without the leading slash).
    pub name: String,
    /// Image the container was created from.
    pub image: String,
    /// Current state.
    pub state: InstanceState,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// Container environment.
    pub env: BTreeMap<String, String>,
}

impl ContainerInstance {
    /// Returns true if the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Returns the target fingerprint label, if present.
    #[must_use]
    pub fn target_hash(&self) -> Option<&str> {
        self.labels.get(LABEL_TARGET_HASH).map(String::as_str)
    }
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart.
    No,
    /// Restart unless explicitly stopped.
    UnlessStopped,
}

impl RestartPolicy {
    /// Returns the runtime's name for this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A host-to-container port binding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortBinding {
    /// Host-side port.
    pub host: u16,
    /// Container-side port.
    pub container: u16,
}

/// A bind mount into the container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    /// Host path.
    pub source: PathBuf,
    /// Path inside the container.
    pub target: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

/// Everything needed to create and start a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Port bindings.
    pub ports: Vec<PortBinding>,
    /// Bind mounts.
    pub mounts: Vec<Mount>,
    /// Restart policy.
    pub restart: RestartPolicy,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

impl RunSpec {
    /// Builds the run spec for a deployment target.
    #[must_use]
    pub fn for_target(target: &DeploymentTarget, target_hash: &str) -> Self {
        let labels = BTreeMap::from([
            (String::from(LABEL_MANAGED), String::from("true")),
            (String::from(LABEL_TARGET_HASH), target_hash.to_string()),
        ]);

        Self {
            name: target.name.clone(),
            image: target.image.clone(),
            env: target.env().into_iter().collect(),
            ports: vec![PortBinding {
                host: target.host_port,
                container: CONTAINER_PORT,
            }],
            mounts: vec![
                Mount {
                    source: target.config_file.clone(),
                    target: String::from(CONTAINER_CONFIG_PATH),
                    read_only: true,
                },
                Mount {
                    source: target.templates_dir.clone(),
                    target: String::from(CONTAINER_TEMPLATES_PATH),
                    read_only: true,
                },
            ],
            restart: RestartPolicy::UnlessStopped,
            labels,
        }
    }
}

/// Result of a command executed inside a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// Returns true if the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stdout and stderr joined, trimmed.
    #[must_use]
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}
