//! CLI subcommand implementations.

pub mod config;
pub mod contract;
pub mod cursor;
pub mod run;
