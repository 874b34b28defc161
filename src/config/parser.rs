//! Settings parser for loading `halldyll.proxy.yaml`.
//!
//! Settings are optional: when no file is given or found, the defaults of
//! [`DeploySettings`] apply. Relative bundle paths in a settings file are
//! resolved against the directory containing that file.

use crate::error::{ConfigError, HalldyllError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use validator::Validate;

use super::spec::DeploySettings;

/// Default settings file names to search for.
pub const DEFAULT_SETTINGS_FILES: &[&str] = &["halldyll.proxy.yaml", "halldyll.proxy.yml"];

/// Parser for deployment settings.
#[derive(Debug, Default)]
pub struct SettingsParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl SettingsParser {
    /// Creates a new settings parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads settings from an explicit file, a discovered file, or defaults.
    ///
    /// An explicit path must exist. Without one, the base path (or the
    /// current directory) is searched for a default settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(&self, explicit: Option<&Path>) -> Result<DeploySettings> {
        if let Some(path) = explicit {
            return self.load_file(path);
        }

        let search_dir = self.base_path.clone().unwrap_or_else(|| PathBuf::from("."));
        match find_settings_file(&search_dir) {
            Some(path) => self.load_file(path),
            None => {
                debug!("No settings file found, using defaults");
                Ok(DeploySettings::default())
            }
        }
    }

    /// Loads settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeploySettings> {
        let path = path.as_ref();
        info!("Loading settings from: {}", path.display());

        if !path.is_file() {
            return Err(HalldyllError::Settings(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HalldyllError::Settings(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut settings = self.parse_yaml(&content, Some(path))?;

        if let Some(dir) = path.parent() {
            settings.bundle.config_file = resolve_relative(dir, &settings.bundle.config_file);
            settings.bundle.templates_dir = resolve_relative(dir, &settings.bundle.templates_dir);
        }

        Ok(settings)
    }

    /// Parses and validates settings from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a value is out of range.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeploySettings> {
        debug!("Parsing YAML settings");

        let settings: DeploySettings = if content.trim().is_empty() {
            DeploySettings::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                HalldyllError::Settings(ConfigError::ParseError {
                    message: format!("YAML parse error: {e}"),
                    location: source.map(|p| p.display().to_string()),
                })
            })?
        };

        settings.validate().map_err(|e| {
            let field = e
                .field_errors()
                .into_keys()
                .map(|k| k.to_string())
                .min()
                .unwrap_or_else(|| String::from("settings"));
            HalldyllError::Settings(ConfigError::validation(e.to_string(), field))
        })?;

        Ok(settings)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                HalldyllError::Settings(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Finds a settings file in the given directory or its parents.
#[must_use]
pub fn find_settings_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();

    loop {
        for filename in DEFAULT_SETTINGS_FILES {
            let candidate = current.join(filename);
            if candidate.is_file() {
                info!("Found settings file: {}", candidate.display());
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
