// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use opsy_config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "opsy",
    about = "Your AI-powered SRE colleague: describe a task, watch it run",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Task to perform; read from stdin when omitted and stdin is piped
    #[arg(value_name = "TASK")]
    pub task: Option<String>,

    /// Path to config file (applied after the standard locations)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Directory with tool definitions (overrides tools.directory)
    #[arg(long, value_name = "DIR")]
    pub tools_dir: Option<PathBuf>,

    /// Model to use (overrides anthropic.model)
    #[arg(long, short = 'M')]
    pub model: Option<String>,

    /// Maximum model calls per run, 0 = unlimited (overrides agent.max_turns)
    #[arg(long, value_name = "N")]
    pub max_turns: Option<u32>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration and exit
    ShowConfig,
    /// List the tools available to the agent
    Tools,
}

impl Cli {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.tools_dir {
            config.tools.directory = dir.to_string_lossy().into_owned();
        }
        if let Some(model) = &self.model {
            config.anthropic.model = model.clone();
        }
        if let Some(max_turns) = self.max_turns {
            config.agent.max_turns = max_turns;
        }
    }

    /// The task from the positional argument, or from piped stdin.
    pub fn read_task(&self) -> anyhow::Result<String> {
        if let Some(task) = self.task.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(task.to_string());
        }
        let stdin = std::io::stdin();
        if stdin.is_terminal() {
            anyhow::bail!("no task given; pass it as an argument or pipe it on stdin");
        }
        let mut task = String::new();
        stdin.lock().read_to_string(&mut task).context("reading task from stdin")?;
        let task = task.trim();
        if task.is_empty() {
            anyhow::bail!("task read from stdin is empty");
        }
        Ok(task.to_string())
    }
}
