// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Prompt sent with every top-level backend call unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Opsy, a site reliability engineer working \
on the user's machine. Break the task down, use the available tools to inspect and change \
the system, and verify the outcome of every command before moving on. Prefer read-only \
commands until you understand the situation. When the task is complete, reply with a short \
summary of what was done and what the user should check.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub anthropic: AnthropicConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tools.timeout == 0 {
            return Err(ConfigError::Invalid("tools.timeout must be greater than zero".into()));
        }
        if self.tools.exec.shell.trim().is_empty() {
            return Err(ConfigError::Invalid("tools.exec.shell must not be empty".into()));
        }
        if self.agent.channel_capacity == 0 {
            return Err(ConfigError::Invalid("agent.channel_capacity must be greater than zero".into()));
        }
        if self.anthropic.max_tokens == 0 {
            return Err(ConfigError::Invalid("anthropic.max_tokens must be greater than zero".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    /// Explicit API key.  Prefer the `ANTHROPIC_API_KEY` environment variable
    /// to keep secrets out of config files.
    pub api_key: Option<String>,
    /// Model name forwarded to the API
    pub model: String,
    /// Sampling temperature (0.0–1.0)
    pub temperature: f32,
    /// Maximum tokens to request in a single completion
    pub max_tokens: u32,
    /// Base URL override for proxies and gateways
    pub base_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-3-7-sonnet-latest".into(),
            temperature: 0.5,
            max_tokens: 1024,
            base_url: "https://api.anthropic.com".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of backend calls in one run; 0 disables the limit
    pub max_turns: u32,
    /// System prompt for top-level runs
    pub system_prompt: String,
    /// Capacity of each communication channel
    pub channel_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            channel_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory scanned for declarative tool definitions (`~` is expanded)
    pub directory: String,
    /// Global timeout in seconds for a single tool call
    pub timeout: u64,
    pub exec: ExecToolConfig,
}

impl ToolsConfig {
    /// Tool directory with a leading `~` expanded.
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.directory).into_owned())
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            directory: "~/.opsy/tools".into(),
            timeout: 120,
            exec: ExecToolConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecToolConfig {
    /// Timeout in seconds for the exec tool; 0 falls back to `tools.timeout`
    pub timeout: u64,
    /// Shell used to interpret command lines (invoked as `<shell> -c <cmd>`)
    pub shell: String,
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self { timeout: 0, shell: "/bin/bash".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Log file; logs go to stderr when unset
    pub path: Option<String>,
}

impl LoggingConfig {
    pub fn file_path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), path: None }
    }
}
