//! Proxy instance lifecycle.
//!
//! This module provides:
//! - Replace-in-place of the named instance (teardown, pull, create)
//! - Post-deploy verification (configuration check, logs, running state)

mod manager;
mod verifier;

pub use manager::{LifecycleManager, LifecycleOutcome};
pub use verifier::{PostDeployVerifier, VerifyOutcome};
