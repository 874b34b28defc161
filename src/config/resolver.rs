//! Target resolution from command-line input.
//!
//! The resolver turns the parsed invocation flags plus the loaded settings
//! into a validated [`DeploymentTarget`]. It performs no I/O beyond reading
//! the working directory to absolutize bundle paths.

use clap::Parser;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;
use validator::Validate;

use crate::cli::{Cli, TargetArgs};
use crate::error::{HalldyllError, Result};

use super::spec::{DeploySettings, DeploymentTarget};

/// Resolves invocation flags into a deployment target.
#[derive(Debug, Clone, Default)]
pub struct TargetResolver {
    /// Settings supplying the image and bundle location.
    settings: DeploySettings,
}

impl TargetResolver {
    /// Creates a resolver over the given settings.
    #[must_use]
    pub const fn new(settings: DeploySettings) -> Self {
        Self { settings }
    }

    /// Parses a full argument vector (program name first) and resolves it.
    ///
    /// # Errors
    ///
    /// Returns [`HalldyllError::InvalidArgument`] for unknown flags, flags
    /// missing their value, malformed ports or empty values.
    pub fn resolve_from<I, T>(&self, argv: I) -> Result<DeploymentTarget>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(argv).map_err(|e| invalid_argument_from_clap(&e))?;
        self.resolve(&cli.target)
    }

    /// Resolves already-parsed target flags.
    ///
    /// # Errors
    ///
    /// Returns [`HalldyllError::InvalidArgument`] if any resolved field is
    /// empty or out of range.
    pub fn resolve(&self, args: &TargetArgs) -> Result<DeploymentTarget> {
        let target = DeploymentTarget {
            name: args.name.clone(),
            image: self.settings.image.clone(),
            upstream_host: args.upstream_host.clone(),
            upstream_port: args.upstream_port,
            host_port: args.host_port,
            config_file: absolutize(&self.settings.bundle.config_file, "bundle.config_file")?,
            templates_dir: absolutize(&self.settings.bundle.templates_dir, "bundle.templates_dir")?,
        };

        target.validate().map_err(|e| {
            let errors = e.field_errors();
            let field = errors
                .keys()
                .map(ToString::to_string)
                .min()
                .unwrap_or_else(|| String::from("target"));
            let reason = errors
                .get(field.as_str())
                .and_then(|list| list.first())
                .and_then(|err| err.message.as_ref())
                .map_or_else(|| String::from("invalid value"), ToString::to_string);
            HalldyllError::invalid_argument(flag_for_field(&field), reason)
        })?;

        debug!(
            "Resolved target {} -> {} on host port {}",
            target.name,
            target.upstream(),
            target.host_port
        );

        Ok(target)
    }
}

/// Converts a clap parse failure into an invalid-argument error naming the
/// offending token.
#[must_use]
pub fn invalid_argument_from_clap(err: &clap::Error) -> HalldyllError {
    let context_string = |kind| match err.get(kind) {
        Some(ContextValue::String(s)) => Some(s.clone()),
        _ => None,
    };

    let token = context_string(ContextKind::InvalidArg).unwrap_or_else(|| String::from("<args>"));

    let reason = match err.kind() {
        ErrorKind::UnknownArgument => String::from("unexpected argument"),
        ErrorKind::InvalidValue | ErrorKind::ValueValidation => {
            match context_string(ContextKind::InvalidValue) {
                Some(value) if !value.is_empty() => format!("invalid value '{value}'"),
                _ => String::from("a value is required"),
            }
        }
        ErrorKind::TooManyValues | ErrorKind::ArgumentConflict => {
            String::from("argument given more than once")
        }
        _ => String::from("invalid invocation"),
    };

    HalldyllError::invalid_argument(token, reason)
}

/// Maps a target field name back to the flag that sets it.
fn flag_for_field(field: &str) -> String {
    match field {
        "name" | "upstream_host" | "upstream_port" | "host_port" => {
            format!("--{}", field.replace('_', "-"))
        }
        other => other.to_string(),
    }
}

fn absolutize(path: &Path, field: &str) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(HalldyllError::invalid_argument(field, "path must not be empty"));
    }
    Ok(std::path::absolute(path)?)
}
