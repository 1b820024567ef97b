use crate::config::{ConnectionDescriptor, RunnerConfig};
use crate::environment::merge_environment;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Fully resolved child invocation: program, arguments and the complete environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

impl ChildCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            working_directory: None,
        }
    }

    /// Program and arguments of `connection`, with its environment overlaid
    /// on the default environment.
    pub fn from_connection(connection: &ConnectionDescriptor) -> Self {
        Self {
            program: connection.command.clone(),
            args: connection.args.clone(),
            env: merge_environment(&connection.env),
            working_directory: None,
        }
    }

    pub fn with_working_directory(mut self, dir: Option<PathBuf>) -> Self {
        self.working_directory = dir;
        self
    }

    /// Connection command of `config` after container preparation replaced
    /// its program and arguments.
    pub fn for_config(config: &RunnerConfig, program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            ..Self::from_connection(&config.connection)
        }
        .with_working_directory(config.working_directory.clone())
    }

    /// Human readable command line used in logs and errors
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// The child gets exactly `env`, piped stdio, and is killed when dropped.
    pub fn to_tokio_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_directory {
            command.current_dir(dir);
        }

        command
    }
}
