//! CareFlow CLI - Main Entry Point
//!
//! Runs the provider/patient/appointment workflow against a portal
//! deployment and inspects the plan and fixtures a run would use.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{config, fixtures, plan, run, ConfigSource, Outcome};
use output::{print_error, LogFormat};

/// CareFlow - End-to-End Workflow Verification
#[derive(Parser)]
#[command(name = "careflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(short, long, default_value = "careflow.toml", global = true)]
    config: PathBuf,

    /// Portal base URL
    #[arg(long, env = "CAREFLOW_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Administrator email
    #[arg(long, env = "CAREFLOW_ADMIN_EMAIL", global = true)]
    admin_email: Option<String>,

    /// Administrator password
    #[arg(long, env = "CAREFLOW_ADMIN_PASSWORD", global = true, hide_env_values = true)]
    admin_password: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the workflow one or more times in parallel
    Run(run::RunArgs),

    /// Show the steps a run would execute
    Plan(plan::PlanArgs),

    /// Show the fixtures generated for a seed
    Fixtures(fixtures::FixturesArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<Outcome> {
    let source = ConfigSource {
        path: cli.config,
        base_url: cli.base_url,
        admin_email: cli.admin_email,
        admin_password: cli.admin_password,
    };

    match cli.command {
        Commands::Run(args) => return run::execute(args, &source, cli.format).await,
        Commands::Plan(args) => plan::execute(args, &source, cli.format)?,
        Commands::Fixtures(args) => fixtures::execute(args, &source, cli.format)?,
        Commands::Config(cmd) => config::execute(cmd, &source, cli.format)?,
    }
    Ok(Outcome::Passed)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let outcome = match dispatch(cli).await {
        Ok(outcome) => outcome,
        Err(e) => {
            print_error(&format!("{:#}", e));
            Outcome::Infrastructure
        }
    };

    std::process::exit(outcome.code());
}
