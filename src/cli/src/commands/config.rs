//! Configuration management commands.
//!
//! The engine configuration lives in `~/.resumable/config.toml` unless
//! `--config` points elsewhere; `RESUMABLE__*` variables override both.

use anyhow::{Context, Result};
use clap::Subcommand;
use resumable_core::config::EngineConfig;
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective engine configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the default configuration file path
    Path,
}

/// Return the path to the configuration file (`~/.resumable/config.toml`).
fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".resumable").join("config.toml"))
}

/// Load the engine configuration from `path`, the default file, or the
/// environment alone, in that order of preference.
pub fn load_engine_config(path: Option<&str>) -> Result<EngineConfig> {
    if let Some(path) = path {
        return EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path));
    }

    if let Ok(default) = config_path() {
        if default.exists() {
            let path = default.to_string_lossy().to_string();
            return EngineConfig::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path));
        }
    }

    EngineConfig::load().context("Failed to load configuration from the environment")
}

pub fn execute(cmd: ConfigCommands, engine: &EngineConfig, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => match format {
            OutputFormat::Table => {
                output::print_header("Configuration");
                output::print_detail("Enforcement mode", &engine.enforcement.mode.to_string());
                output::print_detail("Enforcement horizon", &engine.enforcement.horizon);
                output::print_detail(
                    "Max slice runtime",
                    &duration_label(engine.runner.max_slice_runtime),
                );
                output::print_detail(
                    "Max iterations per slice",
                    &engine
                        .runner
                        .max_iterations_per_slice
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "unlimited".to_string()),
                );
                output::print_detail("Batch size", &engine.runner.batch_size.to_string());
                output::print_detail("Worker", &engine.worker.name);
                output::print_detail("Poll interval", &duration_label(engine.worker.poll_interval));
                output::print_detail("Log level", &engine.logging.level);
            }
            _ => output::print_item(engine, format)?,
        },

        ConfigCommands::Init { force } => {
            let path = config_path()?;
            if path.exists() && !force {
                output::print_info(&format!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                ));
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let content = toml::to_string_pretty(&EngineConfig::default())
                .context("Failed to serialize config")?;
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;

            output::print_success(&format!("Wrote {}", path.display()));
        }

        ConfigCommands::Path => println!("{}", config_path()?.display()),
    }

    Ok(())
}

fn duration_label(duration: std::time::Duration) -> String {
    format!("{:?}", duration)
}
