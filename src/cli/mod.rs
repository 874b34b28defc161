//! CLI module for the Halldyll proxy deployment tool.
//!
//! This module provides the command-line interface and the formatting of
//! its output.

mod commands;
mod output;

pub use commands::{Cli, OutputFormat, TargetArgs};
pub use output::OutputFormatter;
