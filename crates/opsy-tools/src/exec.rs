// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use opsy_config::ToolsConfig;

use crate::definition::{ToolDefinition, ToolInput, INPUT_WORKING_DIRECTORY};
use crate::{ExecutedCommand, Output, ToolError, ToolInputs, ToolResult};

pub const EXEC_TOOL_NAME: &str = "exec";
pub const INPUT_COMMAND: &str = "command";

/// How long to keep draining pipes after the process is gone.  Background
/// children that inherited stdout would otherwise hold the run open.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Built-in tool that runs a command line through the configured shell.
#[derive(Debug)]
pub struct ExecTool {
    config: Arc<ToolsConfig>,
    definition: ToolDefinition,
    schema: Value,
}

enum Completion {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ExecTool {
    pub fn new(config: Arc<ToolsConfig>) -> Self {
        let mut definition = ToolDefinition {
            name: EXEC_TOOL_NAME.into(),
            display_name: "Exec".into(),
            description: "Executes the provided shell command.".into(),
            ..ToolDefinition::default()
        };
        definition.inputs.insert(
            INPUT_COMMAND.into(),
            ToolInput::new("string", "The shell command, including all the arguments, to execute")
                .with_examples(vec![json!("ls -l"), json!("git status"), json!("kubectl get pods -A")]),
        );
        let schema = definition.input_schema();
        Self { config, definition, schema }
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub fn input_schema(&self) -> &Value {
        &self.schema
    }

    /// The exec-specific timeout, or the global tool timeout when unset.
    pub fn timeout(&self) -> Duration {
        match self.config.exec.timeout {
            0 => self.config.global_timeout(),
            secs => Duration::from_secs(secs),
        }
    }

    pub async fn execute(&self, inputs: &ToolInputs, cancel: &CancellationToken) -> Result<Output, ToolError> {
        let command = match inputs.get(INPUT_COMMAND) {
            Some(Value::String(c)) => c.clone(),
            _ => {
                return Err(ToolError::InvalidInputType {
                    input: INPUT_COMMAND.into(),
                    expected: "string".into(),
                })
            }
        };
        let working_directory = match inputs.get(INPUT_WORKING_DIRECTORY) {
            None | Some(Value::Null) => ".".to_string(),
            Some(Value::String(d)) if d.is_empty() => ".".to_string(),
            Some(Value::String(d)) => d.clone(),
            Some(_) => {
                return Err(ToolError::InvalidInputType {
                    input: INPUT_WORKING_DIRECTORY.into(),
                    expected: "string".into(),
                })
            }
        };
        self.run(command, working_directory, cancel).await
    }

    async fn run(
        &self,
        command: String,
        working_directory: String,
        cancel: &CancellationToken,
    ) -> Result<Output, ToolError> {
        let shell = self.config.exec.shell.clone();
        let timeout = self.timeout();
        debug!(tool = EXEC_TOOL_NAME, %command, %working_directory, ?timeout, "executing command");

        let mut cmd = Command::new(&shell);
        cmd.arg("-c")
            .arg(&command)
            .current_dir(&working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so the whole tree can be signalled on timeout.
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut record = ExecutedCommand {
            command,
            working_directory,
            exit_code: -1,
            output: String::new(),
            started_at: None,
            completed_at: None,
        };

        let started_at = Utc::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                warn!(tool = EXEC_TOOL_NAME, %shell, error = %source, "failed to launch command");
                let output = Output {
                    tool: EXEC_TOOL_NAME.into(),
                    result: ToolResult::empty(),
                    is_error: true,
                    executed_command: Some(record),
                };
                return Err(ToolError::Launch { shell, source, output: Box::new(output) });
            }
        };
        record.started_at = Some(started_at);

        let captured = Arc::new(Mutex::new(Vec::<u8>::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(drain(stdout, captured.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(drain(stderr, captured.clone())));
        }

        let completion = tokio::select! {
            status = child.wait() => Completion::Exited(status),
            _ = tokio::time::sleep(timeout) => Completion::TimedOut,
            _ = cancel.cancelled() => Completion::Cancelled,
        };
        if !matches!(completion, Completion::Exited(_)) {
            kill_process_group(&mut child).await;
        }
        record.completed_at = Some(Utc::now());

        let finish = async {
            for reader in &mut readers {
                let _ = reader.await;
            }
        };
        let drained = tokio::time::timeout(DRAIN_GRACE, finish).await.is_ok();
        if !drained {
            debug!(tool = EXEC_TOOL_NAME, "output pipes still open after exit, abandoning readers");
            for reader in &readers {
                reader.abort();
            }
        }
        let bytes = std::mem::take(&mut *captured.lock().unwrap_or_else(PoisonError::into_inner));
        record.output = String::from_utf8_lossy(&bytes).into_owned();

        let mut output = Output {
            tool: EXEC_TOOL_NAME.into(),
            result: ToolResult::empty(),
            is_error: true,
            executed_command: None,
        };

        match completion {
            Completion::Exited(Ok(status)) => {
                let code = exit_code(status);
                record.exit_code = code;
                output.result = ToolResult::Text(record.output.clone());
                output.is_error = code != 0;
                output.executed_command = Some(record);
                info!(tool = EXEC_TOOL_NAME, exit_code = code, "command finished");
                if code == 0 {
                    Ok(output)
                } else {
                    Err(ToolError::Exited { code, output: Box::new(output) })
                }
            }
            Completion::Exited(Err(source)) => {
                output.executed_command = Some(record);
                Err(ToolError::Launch { shell, source, output: Box::new(output) })
            }
            Completion::TimedOut => {
                warn!(tool = EXEC_TOOL_NAME, command = %record.command, ?timeout, "command timed out, killed");
                output.executed_command = Some(record);
                Err(ToolError::TimedOut { timeout, output: Box::new(output) })
            }
            Completion::Cancelled => {
                info!(tool = EXEC_TOOL_NAME, command = %record.command, "command cancelled, killed");
                output.executed_command = Some(record);
                Err(ToolError::Cancelled { output: Box::new(output) })
            }
        }
    }
}

/// Copy `reader` into `sink` one whole line at a time, so lines from stdout
/// and stderr interleave without splitting multibyte characters.
async fn drain<R: AsyncRead + Unpin>(reader: R, sink: Arc<Mutex<Vec<u8>>>) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => sink.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(&line),
        }
    }
}

async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: killpg only delivers a signal; the group was created
            // for this child by `process_group(0)`.
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill().await;
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
