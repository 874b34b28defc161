//! CLI argument definitions.
//!
//! This module defines the invocation surface using clap. Target flags are
//! collected in [`TargetArgs`] so the resolver can work on them directly.

use clap::{Args, Parser};
use std::path::PathBuf;

use crate::config::{DEFAULT_HOST_PORT, DEFAULT_NAME, DEFAULT_UPSTREAM_HOST, DEFAULT_UPSTREAM_PORT};

/// Halldyll Proxy - replace-in-place deployment of an nginx reverse proxy.
#[derive(Parser, Debug)]
#[command(name = "halldyll-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Deployment target flags.
    #[command(flatten)]
    pub target: TargetArgs,

    /// Path to the settings file.
    #[arg(short, long, env = "HALLDYLL_PROXY_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Report format (text, json).
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, default_value = "text")]
    pub log_format: OutputFormat,
}

/// Flags describing the deployment target.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TargetArgs {
    /// Container name to create or replace.
    #[arg(short = 'n', long, default_value = DEFAULT_NAME)]
    pub name: String,

    /// Host the proxy forwards to.
    #[arg(short = 'u', long, default_value = DEFAULT_UPSTREAM_HOST)]
    pub upstream_host: String,

    /// Port the proxy forwards to.
    #[arg(
        short = 'p',
        long,
        default_value_t = DEFAULT_UPSTREAM_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub upstream_port: u16,

    /// Host port bound to the proxy's port 80.
    #[arg(
        short = 'P',
        long,
        default_value_t = DEFAULT_HOST_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub host_port: u16,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
