//! Resumable CLI - inspect cursors, check job contracts and run demo jobs.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use resumable_core::telemetry::LogFormat;

use commands::{config, contract, cursor, run};
use output::OutputFormat;

/// Resumable - interruptible iteration engine CLI
#[derive(Parser)]
#[command(
    name = "resumable",
    author = "Aezi <aezi.zhu@icloud.com>",
    version = "0.1.0",
    about = "Resumable - interruptible iteration engine",
    long_about = "CLI tool for inspecting cursors, validating job contracts and running jobs slice by slice.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Engine configuration file
    #[arg(short, long, global = true, env = "RESUMABLE_CONFIG")]
    config: Option<String>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cursor inspection and encoding
    #[command(subcommand)]
    Cursor(cursor::CursorCommands),

    /// Job contract validation
    #[command(subcommand)]
    Contract(contract::ContractCommands),

    /// Run a demo job slice by slice through the worker
    Run(run::RunArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = dispatch(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let format = cli.output;
    let mut engine = config::load_engine_config(cli.config.as_deref())?;
    match (&cli.log_level, &cli.config) {
        (Some(level), _) => engine.logging.level = level.clone(),
        (None, None) => {
            engine.logging.level = "warn".to_string();
            engine.logging.format = LogFormat::Compact;
        }
        (None, Some(_)) => {}
    }
    resumable_core::telemetry::init_logging(&engine.logging)?;

    match cli.command {
        Commands::Cursor(cmd) => cursor::execute(cmd, format),
        Commands::Contract(cmd) => contract::execute(cmd, format),
        Commands::Run(args) => run::execute(args, &engine, format).await,
        Commands::Config(cmd) => config::execute(cmd, &engine, format),
    }
}
