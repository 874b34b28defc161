//! Configuration module for the Halldyll proxy deployment system.
//!
//! This module handles everything that happens before the container runtime
//! is touched:
//! - Resolving invocation flags into a [`DeploymentTarget`]
//! - Loading optional settings from `halldyll.proxy.yaml`
//! - Preflight checks of the configuration bundle
//! - Computing target fingerprints

mod hash;
mod parser;
mod resolver;
mod spec;
mod validator;

pub use hash::TargetHasher;
pub use parser::{DEFAULT_SETTINGS_FILES, SettingsParser, find_settings_file};
pub use resolver::{TargetResolver, invalid_argument_from_clap};
pub use spec::{
    CONTAINER_CONFIG_PATH, CONTAINER_PORT, CONTAINER_TEMPLATES_PATH, ConfigBundle,
    DEFAULT_CONFIG_FILE, DEFAULT_HOST_PORT, DEFAULT_IMAGE, DEFAULT_NAME, DEFAULT_TEMPLATES_DIR,
    DEFAULT_UPSTREAM_HOST, DEFAULT_UPSTREAM_PORT, DeploySettings, DeploymentTarget,
    ENV_UPSTREAM_HOST, ENV_UPSTREAM_PORT, ProbeConfig,
};
pub use validator::{PreflightReport, PreflightValidator};
