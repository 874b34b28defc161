// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// Tests may unwrap, expect and panic freely
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Halldyll Deploy Proxy
//!
//! Idempotent replace-in-place deployment of a containerized nginx reverse
//! proxy in front of a single upstream service.
//!
//! ## Overview
//!
//! One invocation brings the host to exactly one running proxy instance
//! under a given name, with:
//!
//! - A fixed main configuration file and a templates directory, mounted read-only
//! - The upstream host and port injected as `UPSTREAM_HOST` / `UPSTREAM_PORT`
//! - A host port bound to the proxy's port 80
//! - An `unless-stopped` restart policy
//!
//! Running it again with the same arguments converges to the same end state.
//!
//! ## Architecture
//!
//! Every run is a strictly sequential pipeline:
//!
//! 1. **Resolve**: command-line flags and settings become a [`DeploymentTarget`]
//! 2. **Preflight**: the configuration bundle must exist before anything is touched
//! 3. **Lifecycle**: any prior instance is torn down, the image pulled, the new one created
//! 4. **Verify**: nginx checks its rendered configuration and the instance must be running
//!
//! The first failing stage aborts the run with a distinct exit code.
//!
//! ## Modules
//!
//! - [`config`]: Target resolution, settings parsing and preflight checks
//! - [`runtime`]: Container runtime abstraction and the `docker` CLI client
//! - [`lifecycle`]: Replace-in-place and post-deploy verification
//! - [`reconciler`]: The deployment pipeline
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! # halldyll.proxy.yaml (every field optional)
//! image: nginx:1.27-alpine
//! bundle:
//!   config_file: nginx/nginx.conf
//!   templates_dir: nginx/templates
//! stop_timeout_secs: 10
//! log_tail: 50
//! probe:
//!   path: /healthz
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod reconciler;
pub mod runtime;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, OutputFormatter};
pub use config::{DeploySettings, DeploymentTarget, PreflightValidator, SettingsParser, TargetResolver};
pub use error::{HalldyllError, Result};
pub use lifecycle::{LifecycleManager, PostDeployVerifier};
pub use reconciler::{DeploymentReport, Reconciler, Stage, StageEvent};
pub use runtime::{ContainerRuntime, DockerCli, HealthChecker};
