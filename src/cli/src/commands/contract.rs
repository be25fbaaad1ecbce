//! Job contract validation command.
//!
//! Reads a contract from a JSON, YAML or TOML file and reports how the
//! validator binds the cursor, or why it rejects the contract.

use anyhow::{Context, Result};
use clap::Subcommand;
use resumable_core::jobs::{ContractValidator, CursorBinding, JobContract};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ContractCommands {
    /// Validate a contract file
    Check {
        /// Path to a .json, .yaml/.yml or .toml contract
        path: String,
    },

    /// Print the standard contract for a job type
    Template {
        /// Job type name
        #[arg(default_value = "ExampleJob")]
        job_type: String,
    },
}

#[derive(Tabled, Serialize)]
struct OperationRow {
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Parameters")]
    parameters: String,
}

fn load_contract(path: &str) -> Result<JobContract> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("json");

    let contract = match extension {
        "yaml" | "yml" => serde_yaml::from_str(&content).context("Failed to parse YAML contract")?,
        "toml" => toml::from_str(&content).context("Failed to parse TOML contract")?,
        _ => serde_json::from_str(&content).context("Failed to parse JSON contract")?,
    };
    Ok(contract)
}

fn binding_label(binding: CursorBinding) -> &'static str {
    match binding {
        CursorBinding::Named { required: true } => "named `cursor`",
        CursorBinding::Named { required: false } => "named `cursor` with default",
        CursorBinding::NamedVariadic => "named catch-all",
        CursorBinding::FullyVariadic => "positional catch-all",
    }
}

pub fn execute(cmd: ContractCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ContractCommands::Check { path } => {
            let contract = load_contract(&path)?;
            let validated = ContractValidator::validate(&contract)?;

            match format {
                OutputFormat::Table => {
                    let rows: Vec<OperationRow> = validated
                        .contract
                        .operations
                        .iter()
                        .map(|op| OperationRow {
                            operation: op.name.clone(),
                            parameters: op
                                .parameters
                                .iter()
                                .map(|p| p.name.as_str())
                                .collect::<Vec<_>>()
                                .join(", "),
                        })
                        .collect();
                    output::print_list(&rows, format)?;
                    output::print_detail("Cursor binding", binding_label(validated.cursor_binding));
                    output::print_success(&format!("{} is a valid job contract", validated.job_type()));
                }
                _ => output::print_item(&validated, format)?,
            }
        }

        ContractCommands::Template { job_type } => {
            output::print_item(&JobContract::standard(job_type), format)?;
        }
    }

    Ok(())
}
