// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::Output;

/// Everything that can go wrong while loading or executing a tool.
///
/// Execution failures (`Exited`, `TimedOut`, `Cancelled`, `Launch`, `Run`)
/// carry the best-effort [`Output`] of the attempt: the error says *how* the
/// execution failed, the output says *what* to show for it.  Validation
/// failures carry no output because nothing was executed.
#[derive(Debug, Error)]
pub enum ToolError {
    // ── Loading ──────────────────────────────────────────────────────────────
    #[error("error loading tools from {path}: {source}")]
    LoadingTools {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading tool definition {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing tool definition {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("tool is missing display name")]
    MissingDisplayName,

    #[error("tool is missing description")]
    MissingDescription,

    #[error("tool input is missing type: {0:?}")]
    InputMissingType(String),

    #[error("tool input is missing description: {0:?}")]
    InputMissingDescription(String),

    #[error("tool executable not found: {0:?}")]
    ExecutableNotFound(String),

    // ── Lookup ───────────────────────────────────────────────────────────────
    #[error("tool not found: {0:?}")]
    NotFound(String),

    // ── Input validation ─────────────────────────────────────────────────────
    #[error("invalid tool input type: {input:?} must be {expected}")]
    InvalidInputType { input: String, expected: String },

    #[error("missing required tool input: {0:?}")]
    MissingInput(String),

    // ── Execution ────────────────────────────────────────────────────────────
    #[error("exit status {code}")]
    Exited { code: i32, output: Box<Output> },

    #[error("signal: killed (timed out after {}s)", .timeout.as_secs_f64())]
    TimedOut { timeout: Duration, output: Box<Output> },

    #[error("signal: killed (cancelled)")]
    Cancelled { output: Box<Output> },

    #[error("launching {shell}: {source}")]
    Launch {
        shell: String,
        #[source]
        source: std::io::Error,
        output: Box<Output>,
    },

    #[error("tool run failed: {message}")]
    Run { message: String, output: Box<Output> },

    #[error("no runner configured for tool {0:?}")]
    RunnerUnavailable(String),
}

impl ToolError {
    /// The best-effort output of a failed execution, if anything ran.
    pub fn output(&self) -> Option<&Output> {
        match self {
            Self::Exited { output, .. }
            | Self::TimedOut { output, .. }
            | Self::Cancelled { output }
            | Self::Launch { output, .. }
            | Self::Run { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn into_output(self) -> Option<Output> {
        match self {
            Self::Exited { output, .. }
            | Self::TimedOut { output, .. }
            | Self::Cancelled { output }
            | Self::Launch { output, .. }
            | Self::Run { output, .. } => Some(*output),
            _ => None,
        }
    }

    /// True for failures detected before any side effect happened.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidInputType { .. } | Self::MissingInput(_))
    }
}
