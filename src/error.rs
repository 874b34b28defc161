//! Error types for the Halldyll proxy deployment system.
//!
//! The top-level [`HalldyllError`] mirrors the failure taxonomy of a
//! deployment run: bad input, missing configuration, image pull, container
//! creation, in-container validation and the final running check. Each kind
//! maps to a distinct process exit code for scripting consumers.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Halldyll proxy deployment system.
#[derive(Debug, Error)]
pub enum HalldyllError {
    /// Invalid command-line input. Nothing has been touched.
    #[error("Invalid argument '{token}': {reason}")]
    InvalidArgument {
        /// The offending token (flag or field).
        token: String,
        /// Why the token was rejected.
        reason: String,
    },

    /// A required configuration artifact is missing. Nothing has been touched.
    #[error("Missing configuration: {path} ({reason})")]
    MissingConfig {
        /// The exact path that failed the check.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The image could not be pulled. No new instance was created.
    #[error("Failed to pull image {image}: {message}")]
    ImagePullFailed {
        /// Image reference.
        image: String,
        /// Runtime error output.
        message: String,
    },

    /// The new instance could not be created. Any prior instance is gone.
    #[error("Failed to create container '{name}': {message}")]
    ContainerCreateFailed {
        /// Container name.
        name: String,
        /// Runtime error output.
        message: String,
        /// Last known log tail of the instance, if one exists.
        log_tail: Option<String>,
    },

    /// The instance is up but its rendered configuration is rejected.
    #[error("Configuration check failed in container '{name}': {output}")]
    ConfigInvalid {
        /// Container name.
        name: String,
        /// Output of the in-container check.
        output: String,
        /// Captured log tail.
        log_tail: Option<String>,
    },

    /// The instance was created but is not observed running.
    #[error("Container '{name}' is not running after deployment")]
    InstanceNotRunning {
        /// Container name.
        name: String,
        /// Captured log tail.
        log_tail: Option<String>,
    },

    /// Settings file errors.
    #[error("Settings error: {0}")]
    Settings(#[from] ConfigError),

    /// Container runtime errors outside the classified stages.
    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// The run was interrupted before completion.
    #[error("Deployment interrupted")]
    Interrupted,

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Settings-file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file was not found.
    #[error("Settings file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The settings file could not be parsed.
    #[error("Failed to parse settings: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Settings validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Container runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be invoked at all.
    #[error("Container runtime unavailable: {message}")]
    Unavailable {
        /// Description of the spawn failure.
        message: String,
    },

    /// A runtime command exited unsuccessfully.
    #[error("{operation} failed: {message}")]
    CommandFailed {
        /// Runtime operation (inspect, stop, run, ...).
        operation: String,
        /// Error output of the command.
        message: String,
    },

    /// A runtime command produced output that could not be understood.
    #[error("Invalid {operation} output: {message}")]
    InvalidResponse {
        /// Runtime operation.
        operation: String,
        /// Description of the problem.
        message: String,
    },

    /// A bounded runtime command did not finish in time.
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// Runtime operation.
        operation: String,
        /// The bound that was exceeded.
        secs: u64,
    },
}

/// Result type alias for Halldyll operations.
pub type Result<T> = std::result::Result<T, HalldyllError>;

impl HalldyllError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing-configuration error for a path.
    #[must_use]
    pub fn missing_config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MissingConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArgument { .. } => 2,
            Self::MissingConfig { .. } => 3,
            Self::ImagePullFailed { .. } => 4,
            Self::ContainerCreateFailed { .. } => 5,
            Self::ConfigInvalid { .. } => 6,
            Self::InstanceNotRunning { .. } => 7,
            Self::Interrupted => 130,
            Self::Settings(_) | Self::Runtime(_) | Self::Io(_) | Self::Internal(_) => 1,
        }
    }

    /// Returns true if nothing on the host was mutated before this error.
    #[must_use]
    pub const fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::MissingConfig { .. } | Self::Settings(_)
        )
    }

    /// Returns the captured log tail attached to this error, if any.
    #[must_use]
    pub fn log_tail(&self) -> Option<&str> {
        match self {
            Self::ContainerCreateFailed { log_tail, .. }
            | Self::ConfigInvalid { log_tail, .. }
            | Self::InstanceNotRunning { log_tail, .. } => log_tail.as_deref(),
            _ => None,
        }
    }

    /// Attaches a log tail to errors that can carry one.
    #[must_use]
    pub fn with_log_tail(mut self, tail: Option<String>) -> Self {
        match &mut self {
            Self::ContainerCreateFailed { log_tail, .. }
            | Self::ConfigInvalid { log_tail, .. }
            | Self::InstanceNotRunning { log_tail, .. } => {
                if log_tail.is_none() {
                    *log_tail = tail;
                }
            }
            _ => {}
        }
        self
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl RuntimeError {
    /// Creates a command failure for an operation.
    #[must_use]
    pub fn command_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-response error for an operation.
    #[must_use]
    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
