use crate::logging::LogFormat;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mcp_runner_core::config::{ConnectionDescriptor, RunnerConfig, RunnerSettings};
use std::path::PathBuf;

/// Run an MCP server and bridge its stdio to this process
#[derive(Debug, Parser)]
#[command(name = "mcp-runner", version, about)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Log at debug level unless a filter is set in the environment
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the server and relay JSON-RPC until it exits or a signal arrives
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Connection descriptor as JSON: {"command": ..., "args": [...], "env": {...}}
    #[arg(long, required_unless_present = "connection_file", conflicts_with = "connection_file")]
    pub connection: Option<String>,

    /// File holding the connection descriptor JSON
    #[arg(long)]
    pub connection_file: Option<PathBuf>,

    /// JSON file with runner settings (engine, machine name, registry, ...)
    #[arg(long)]
    pub settings_file: Option<PathBuf>,

    /// Name used in logs
    #[arg(long, default_value = "mcp-runner")]
    pub name: String,

    /// Working directory of the server process
    #[arg(long)]
    pub working_directory: Option<PathBuf>,
}

impl RunArgs {
    pub fn connection(&self) -> Result<ConnectionDescriptor> {
        let text = match (&self.connection, &self.connection_file) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => anyhow::bail!("either --connection or --connection-file is required"),
        };
        Ok(ConnectionDescriptor::from_json(&text)?)
    }

    pub fn settings(&self) -> Result<RunnerSettings> {
        match &self.settings_file {
            Some(path) => Ok(RunnerSettings::from_file(path)?),
            None => Ok(RunnerSettings::default()),
        }
    }

    pub fn runner_config(&self) -> Result<RunnerConfig> {
        let mut builder = RunnerConfig::builder();
        builder
            .name(self.name.clone())
            .connection(self.connection()?)
            .settings(self.settings()?);
        if let Some(dir) = &self.working_directory {
            builder.working_directory(dir.clone());
        }
        builder.build().context("invalid runner configuration")
    }
}
