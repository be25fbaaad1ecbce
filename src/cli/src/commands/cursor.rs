//! Cursor inspection commands.
//!
//! Cursors are given in their JSON form, tagged values included, or as
//! URL-safe tokens.

use anyhow::{Context, Result};
use clap::Subcommand;
use resumable_core::cursor::{self, Classification, CursorValue};
use serde::Serialize;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CursorCommands {
    /// Report whether a cursor is primitive-serializable
    Classify {
        /// Cursor as JSON, e.g. '[3, {"__cursor_type": "symbol", "value": "open"}]'
        json: String,
    },

    /// Encode a JSON cursor as a token
    Encode {
        /// Cursor as JSON
        json: String,
    },

    /// Decode a token back to its JSON cursor
    Decode {
        /// Token produced by `encode`
        token: String,
    },
}

#[derive(Serialize)]
struct ClassifyReport {
    cursor: serde_json::Value,
    primitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

fn parse(json: &str) -> Result<CursorValue> {
    let raw: serde_json::Value = serde_json::from_str(json).context("Cursor is not valid JSON")?;
    Ok(cursor::from_json(&raw)?)
}

pub fn execute(cmd: CursorCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        CursorCommands::Classify { json } => {
            let value = parse(&json)?;
            let report = match value.classify() {
                Classification::Primitive => ClassifyReport {
                    cursor: cursor::to_json(&value)?,
                    primitive: true,
                    kind: None,
                    path: None,
                },
                Classification::NonPrimitive { kind, path } => ClassifyReport {
                    cursor: cursor::to_json(&value)?,
                    primitive: false,
                    kind: Some(kind.to_string()),
                    path: Some(path),
                },
            };

            match format {
                OutputFormat::Table => {
                    output::print_header("Cursor");
                    output::print_detail("Value", &report.cursor.to_string());
                    match (&report.kind, &report.path) {
                        (Some(kind), Some(path)) => {
                            output::print_detail("Kind", kind);
                            output::print_detail("Path", path);
                            output::print_warning(
                                "Non-primitive cursors are rejected once enforcement is strict",
                            );
                        }
                        _ => output::print_success("Primitive-serializable"),
                    }
                }
                _ => output::print_item(&report, format)?,
            }
        }

        CursorCommands::Encode { json } => {
            let token = cursor::encode_token(&parse(&json)?)?;
            match format {
                OutputFormat::Table => println!("{}", token),
                _ => output::print_item(&serde_json::json!({ "token": token }), format)?,
            }
        }

        CursorCommands::Decode { token } => {
            let json = cursor::to_json(&cursor::decode_token(token.trim())?)?;
            match format {
                OutputFormat::Table => println!("{}", json),
                _ => output::print_item(&json, format)?,
            }
        }
    }

    Ok(())
}
