//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, RunCommand, TriggerCommand, ValidateCommand};
use std::ffi::OsString;

/// Local runner for push and pull-request CI workflows
#[derive(Debug, Parser, Clone)]
#[command(name = "cirun")]
#[command(version)]
#[command(about = "Run GitHub-style CI workflows locally", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow for an event
    Run(RunCommand),

    /// Validate a workflow file
    Validate(ValidateCommand),

    /// Check whether an event would start a run
    Trigger(TriggerCommand),

    /// List workflows in history
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
