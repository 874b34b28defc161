//! Deployment specification types.
//!
//! This module defines the desired end state of a proxy deployment
//! ([`DeploymentTarget`]), the configuration bundle it mounts
//! ([`ConfigBundle`]) and the tunable settings loaded from
//! `halldyll.proxy.yaml` ([`DeploySettings`]).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Default container name.
pub const DEFAULT_NAME: &str = "nginx-dev";

/// Default upstream host.
pub const DEFAULT_UPSTREAM_HOST: &str = "127.0.0.1";

/// Default upstream port.
pub const DEFAULT_UPSTREAM_PORT: u16 = 3000;

/// Default host port bound to the proxy.
pub const DEFAULT_HOST_PORT: u16 = 8080;

/// Default proxy image.
pub const DEFAULT_IMAGE: &str = "nginx:1.27-alpine";

/// Default main configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "nginx/nginx.conf";

/// Default templates directory, relative to the working directory.
pub const DEFAULT_TEMPLATES_DIR: &str = "nginx/templates";

/// Port the proxy listens on inside the container.
pub const CONTAINER_PORT: u16 = 80;

/// Mount point of the main configuration file inside the container.
pub const CONTAINER_CONFIG_PATH: &str = "/etc/nginx/nginx.conf";

/// Mount point of the templates directory inside the container.
pub const CONTAINER_TEMPLATES_PATH: &str = "/etc/nginx/templates";

/// Environment variable carrying the upstream host into the templates.
pub const ENV_UPSTREAM_HOST: &str = "UPSTREAM_HOST";

/// Environment variable carrying the upstream port into the templates.
pub const ENV_UPSTREAM_PORT: &str = "UPSTREAM_PORT";

/// The desired end state of one deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct DeploymentTarget {
    /// Container name, unique per host.
    #[validate(length(min = 1, message = "must not be empty"))]
    pub name: String,
    /// Image reference to run.
    #[validate(length(min = 1, message = "must not be empty"))]
    pub image: String,
    /// Host the proxy forwards to.
    #[validate(length(min = 1, message = "must not be empty"))]
    pub upstream_host: String,
    /// Port the proxy forwards to.
    #[validate(range(min = 1, message = "must be between 1 and 65535"))]
    pub upstream_port: u16,
    /// Host-side port bound to the container's port 80.
    #[validate(range(min = 1, message = "must be between 1 and 65535"))]
    pub host_port: u16,
    /// Main configuration file mounted read-only.
    pub config_file: PathBuf,
    /// Templates directory mounted read-only.
    pub templates_dir: PathBuf,
}

impl DeploymentTarget {
    /// Returns the configuration bundle this target mounts.
    #[must_use]
    pub fn bundle(&self) -> ConfigBundle {
        ConfigBundle {
            config_file: self.config_file.clone(),
            templates_dir: self.templates_dir.clone(),
        }
    }

    /// Returns the environment injected into the container.
    #[must_use]
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            (String::from(ENV_UPSTREAM_HOST), self.upstream_host.clone()),
            (String::from(ENV_UPSTREAM_PORT), self.upstream_port.to_string()),
        ]
    }

    /// Returns the upstream as `host:port`.
    #[must_use]
    pub fn upstream(&self) -> String {
        format!("{}:{}", self.upstream_host, self.upstream_port)
    }
}

/// The configuration artifacts that must exist before deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigBundle {
    /// Main configuration file.
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,
    /// Templates directory rendered by the image entrypoint.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
}

impl Default for ConfigBundle {
    fn default() -> Self {
        Self {
            config_file: default_config_file(),
            templates_dir: default_templates_dir(),
        }
    }
}

/// Tunable deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct DeploySettings {
    /// Image reference to run.
    #[validate(length(min = 1, message = "image must not be empty"))]
    pub image: String,
    /// Location of the configuration bundle.
    pub bundle: ConfigBundle,
    /// Bound on the graceful stop of a prior instance.
    #[validate(range(min = 1, message = "stop timeout must be at least 1 second"))]
    pub stop_timeout_secs: u64,
    /// Number of log lines captured after deployment.
    #[validate(range(min = 1, message = "log tail must be at least 1 line"))]
    pub log_tail: u32,
    /// Delay between create and verification, in milliseconds.
    pub settle_millis: u64,
    /// Optional bound on the image pull. Unbounded when unset.
    #[validate(range(min = 1, message = "pull timeout must be at least 1 second"))]
    pub pull_timeout_secs: Option<u64>,
    /// Optional HTTP probe after verification.
    #[validate(nested)]
    pub probe: Option<ProbeConfig>,
    /// Container runtime binary.
    #[validate(length(min = 1, message = "docker binary must not be empty"))]
    pub docker_binary: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            image: String::from(DEFAULT_IMAGE),
            bundle: ConfigBundle::default(),
            stop_timeout_secs: 10,
            log_tail: 50,
            settle_millis: 1000,
            pull_timeout_secs: None,
            probe: None,
            docker_binary: String::from("docker"),
        }
    }
}

/// HTTP probe issued against the host port after verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ProbeConfig {
    /// Request path, e.g. `/healthz`.
    #[validate(length(min = 1, message = "probe path must not be empty"))]
    pub path: String,
    /// Number of attempts before giving up.
    #[serde(default = "default_probe_attempts")]
    #[validate(range(min = 1, message = "probe attempts must be at least 1"))]
    pub attempts: u32,
    /// Delay between attempts.
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,
}

fn default_config_file() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TEMPLATES_DIR)
}

const fn default_probe_attempts() -> u32 {
    5
}

const fn default_probe_interval() -> u64 {
    2
}
