//! Halldyll proxy CLI entrypoint.
//!
//! This is the main entrypoint for the halldyll-proxy command-line tool.

use std::process::ExitCode;

use halldyll_deploy_proxy::cli::{Cli, OutputFormat, OutputFormatter};
use halldyll_deploy_proxy::config::{SettingsParser, TargetResolver, invalid_argument_from_clap};
use halldyll_deploy_proxy::error::{HalldyllError, Result};
use halldyll_deploy_proxy::reconciler::{DeploymentReport, Reconciler};
use halldyll_deploy_proxy::runtime::DockerCli;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    // Loaded before parsing so HALLDYLL_PROXY_SETTINGS may come from .env
    let dotenv = SettingsParser::new().load_dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(invalid_argument_from_clap(&e).exit_code()),
            };
        }
    };

    init_logging(cli.verbose, cli.log_format);

    if let Err(e) = dotenv {
        warn!("Ignoring .env file: {e}");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);

    match runtime.block_on(run(&cli, &formatter)) {
        Ok(report) => {
            println!("{}", formatter.format_report(&report));
            ExitCode::SUCCESS
        }
        Err(e) => {
            let rendered = formatter.format_error(&e);
            if cli.output == OutputFormat::Json {
                println!("{rendered}");
            } else {
                eprintln!("{rendered}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: OutputFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: &Cli, formatter: &OutputFormatter) -> Result<DeploymentReport> {
    let settings = SettingsParser::new().load(cli.settings.as_deref())?;
    let target = TargetResolver::new(settings.clone()).resolve(&cli.target)?;
    debug!("Resolved target: {target:?}");

    let docker = DockerCli::with_binary(settings.docker_binary.clone());
    let reconciler = Reconciler::new(&docker, &settings).with_listener(|event| {
        if let Some(line) = formatter.format_event(event) {
            eprintln!("{line}");
        }
    });

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = reconciler.deploy(&target) => result,
        () = interrupted => {
            warn!("Interrupted while deploying '{}'", target.name);
            Err(HalldyllError::Interrupted)
        }
    }
}
