//! Preflight validation of the configuration bundle.
//!
//! Runs before anything touches the container runtime, so a failure here
//! leaves the host exactly as it was.

use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{HalldyllError, Result};

use super::spec::ConfigBundle;

/// Suffix the image entrypoint renders into configuration files.
const TEMPLATE_SUFFIX: &str = ".template";

/// Validator for the configuration bundle.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreflightValidator;

/// Result of a successful preflight check.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PreflightReport {
    /// Main configuration file that was checked.
    pub config_file: PathBuf,
    /// Templates directory that was checked.
    pub templates_dir: PathBuf,
    /// Number of `*.template` files found.
    pub template_count: usize,
    /// Non-fatal issues.
    pub warnings: Vec<String>,
}

impl PreflightValidator {
    /// Creates a new preflight validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks that the bundle's file and directory exist and are readable.
    ///
    /// # Errors
    ///
    /// Returns [`HalldyllError::MissingConfig`] naming the exact path that
    /// failed.
    pub fn check(&self, bundle: &ConfigBundle) -> Result<PreflightReport> {
        Self::check_config_file(&bundle.config_file)?;
        let template_count = Self::check_templates_dir(&bundle.templates_dir)?;

        let mut report = PreflightReport {
            config_file: bundle.config_file.clone(),
            templates_dir: bundle.templates_dir.clone(),
            template_count,
            warnings: Vec::new(),
        };

        if template_count == 0 {
            let message = format!(
                "No *{TEMPLATE_SUFFIX} files in {}; nothing will be rendered",
                bundle.templates_dir.display()
            );
            warn!("{message}");
            report.warnings.push(message);
        }

        debug!(
            "Preflight passed: {} and {} template(s)",
            bundle.config_file.display(),
            template_count
        );
        Ok(report)
    }

    /// Checks the main configuration file.
    fn check_config_file(path: &Path) -> Result<()> {
        let metadata = fs::metadata(path)
            .map_err(|e| HalldyllError::missing_config(path, describe_io(&e)))?;

        if !metadata.is_file() {
            return Err(HalldyllError::missing_config(path, "not a regular file"));
        }

        File::open(path)
            .map_err(|e| HalldyllError::missing_config(path, format!("not readable: {e}")))?;

        Ok(())
    }

    /// Checks the templates directory and counts its templates.
    fn check_templates_dir(path: &Path) -> Result<usize> {
        let metadata = fs::metadata(path)
            .map_err(|e| HalldyllError::missing_config(path, describe_io(&e)))?;

        if !metadata.is_dir() {
            return Err(HalldyllError::missing_config(path, "not a directory"));
        }

        let entries = fs::read_dir(path)
            .map_err(|e| HalldyllError::missing_config(path, format!("not readable: {e}")))?;

        Ok(entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(TEMPLATE_SUFFIX))
            .count())
    }
}

fn describe_io(err: &std::io::Error) -> String {
    if err.kind() == std::io::ErrorKind::NotFound {
        String::from("not found")
    } else {
        err.to_string()
    }
}
