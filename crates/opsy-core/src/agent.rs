// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use opsy_config::AgentConfig;
use opsy_model::{CompletionRequest, ContentBlock, ModelProvider, ToolUse};
use opsy_tools::{
    head_tail_truncate, Output, ToolInputs, ToolRegistry, ToolRunRequest, ToolRunner, INPUT_COMMAND, INPUT_TASK,
};

use crate::{AgentError, Communication, Conversation, Message, Status};

/// Byte ceiling for one tool result folded back into the conversation.
const TOOL_RESULT_LIMIT: usize = 20_000;

/// Where a run is in the turn protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Running,
    ToolDispatch,
    Finished,
    Failed,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunReport {
    /// `Finished` or `Failed`.
    pub state: AgentState,
    pub conversation: Conversation,
    /// Outputs of every tool execution, in execution order.
    pub outputs: Vec<Output>,
    pub error: Option<AgentError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == AgentState::Finished
    }

    /// Final assistant text of a finished run.
    pub fn answer(&self) -> Option<String> {
        self.conversation.final_answer()
    }
}

/// The orchestration engine.  Drives the model ↔ tool loop for one task at
/// a time and publishes progress on its [`Communication`] bus.
///
/// The agent keeps no per-run state, so one instance can serve a top-level
/// run and the nested runs its declarative tools start.
pub struct Agent {
    model: Arc<dyn ModelProvider>,
    config: Arc<AgentConfig>,
    communication: Communication,
}

impl Agent {
    pub fn new(model: Arc<dyn ModelProvider>, config: Arc<AgentConfig>, communication: Communication) -> Self {
        Self { model, config, communication }
    }

    /// Run `task` to completion.  Publishes `Status::Running` first and
    /// exactly one terminal status last.
    pub async fn run(&self, task: &str, tools: &ToolRegistry, cancel: CancellationToken) -> RunReport {
        info!(model = self.model.model_name(), tools = tools.len(), "starting run");
        self.communication.status(Status::Running).await;

        let report = self.drive(&self.config.system_prompt, task, tools, &cancel, None).await;

        let terminal = match report.state {
            AgentState::Finished => Status::Finished,
            _ => Status::Failed,
        };
        match &report.error {
            Some(e) => warn!(error = %e, "run failed"),
            None => info!(turns = report.conversation.len(), "run finished"),
        }
        self.communication.status(terminal).await;
        report
    }

    /// The turn loop shared by top-level and nested runs.  `scope` names the
    /// declarative tool a nested run works for.
    async fn drive(
        &self,
        system: &str,
        task: &str,
        tools: &ToolRegistry,
        cancel: &CancellationToken,
        scope: Option<&str>,
    ) -> RunReport {
        let mut state = AgentState::Idle;
        let mut conversation = Conversation::new(task);
        let mut outputs = Vec::new();
        let schemas = tools.schemas();
        let mut turns = 0u32;

        transition(&mut state, AgentState::Running);
        let outcome: Result<(), AgentError> = loop {
            if cancel.is_cancelled() {
                break Err(AgentError::Cancelled);
            }
            if self.config.max_turns > 0 && turns >= self.config.max_turns {
                break Err(AgentError::TurnLimit(self.config.max_turns));
            }
            turns += 1;

            let request = CompletionRequest {
                system: Some(system.to_string()),
                messages: conversation.messages().to_vec(),
                tools: schemas.clone(),
            };
            debug!(turn = turns, messages = request.messages.len(), "calling model");
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = self.model.complete(request) => Some(r),
            };
            let response = match response {
                None => break Err(AgentError::Cancelled),
                Some(Err(e)) => break Err(AgentError::Backend(e)),
                Some(Ok(r)) => r,
            };

            let turn = response.into_message();
            if let Some(text) = turn.text() {
                self.communication.message(Message::new(scope, text)).await;
            }
            let uses: Vec<ToolUse> = turn.tool_uses().into_iter().cloned().collect();
            conversation.push(turn);
            if uses.is_empty() {
                break Ok(());
            }

            transition(&mut state, AgentState::ToolDispatch);
            let mut results = Vec::with_capacity(uses.len());
            for tool_use in &uses {
                results.push(self.dispatch(tool_use, tools, cancel, &mut outputs).await);
            }
            conversation.push(opsy_model::Message::tool_results(results));
            transition(&mut state, AgentState::Running);
        };

        let error = outcome.err();
        transition(&mut state, if error.is_some() { AgentState::Failed } else { AgentState::Finished });
        RunReport { state, conversation, outputs, error }
    }

    /// Execute one tool use and turn its outcome into a tool-result block.
    /// Never fails: every problem is reported to the model as an error result.
    async fn dispatch(
        &self,
        tool_use: &ToolUse,
        tools: &ToolRegistry,
        cancel: &CancellationToken,
        outputs: &mut Vec<Output>,
    ) -> ContentBlock {
        let name = tool_use.name.as_str();
        if cancel.is_cancelled() {
            return ContentBlock::tool_result(&tool_use.id, "cancelled before execution", true);
        }

        let tool = match tools.get(name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(tool = name, "model requested an unknown tool");
                self.communication.message(Message::new(Some(name), format!("Tool `{name}` is not available"))).await;
                return ContentBlock::tool_result(&tool_use.id, e.to_string(), true);
            }
        };
        let inputs: Option<ToolInputs> = match &tool_use.input {
            Value::Object(map) => Some(map.clone()),
            Value::Null => Some(ToolInputs::new()),
            _ => None,
        };
        let summary = describe(tool.display_name(), inputs.as_ref().unwrap_or(&ToolInputs::new()));
        self.communication.message(Message::new(Some(name), summary)).await;

        let Some(inputs) = inputs else {
            const NOT_AN_OBJECT: &str = "tool input must be a JSON object";
            self.communication
                .message(Message::new(Some(name), format!("{} failed: {NOT_AN_OBJECT}", tool.display_name())))
                .await;
            return ContentBlock::tool_result(&tool_use.id, NOT_AN_OBJECT, true);
        };
        debug!(tool = name, id = %tool_use.id, "executing tool");

        let result = tool.execute(&inputs, cancel).await;

        let executed = match &result {
            Ok(out) => out.executed_command.clone(),
            Err(e) => e.output().and_then(|o| o.executed_command.clone()),
        };
        if let Some(command) = executed {
            self.communication.command(command).await;
        }

        let (content, is_error) = match &result {
            Ok(out) => (out.result.to_string(), out.is_error),
            Err(e) => {
                self.communication
                    .message(Message::new(Some(name), format!("{} failed: {e}", tool.display_name())))
                    .await;
                match e.output().filter(|o| !o.result.is_empty()) {
                    Some(out) => (format!("{e}\n\n{}", out.result), true),
                    None => (e.to_string(), true),
                }
            }
        };
        match result {
            Ok(out) => outputs.push(out),
            Err(e) => outputs.extend(e.into_output()),
        }

        ContentBlock::tool_result(&tool_use.id, head_tail_truncate(&content, TOOL_RESULT_LIMIT), is_error)
    }
}

/// Nested runs for declarative tools.  They publish commands and messages on
/// the shared bus but never a status.
#[async_trait]
impl ToolRunner for Agent {
    async fn run_tool(&self, request: ToolRunRequest, cancel: CancellationToken) -> anyhow::Result<String> {
        info!(tool = %request.tool, "starting nested run");
        let report = self
            .drive(&request.system_prompt, &request.task, &request.tools, &cancel, Some(request.tool.as_str()))
            .await;
        match report.error {
            Some(e) => Err(e.into()),
            None => Ok(report.answer().unwrap_or_default()),
        }
    }
}

fn transition(state: &mut AgentState, next: AgentState) {
    debug!(from = ?*state, to = ?next, "agent state");
    *state = next;
}

/// One-line summary of a tool attempt for the message stream.
pub(crate) fn describe(display_name: &str, inputs: &ToolInputs) -> String {
    let detail = inputs
        .get(INPUT_COMMAND)
        .or_else(|| inputs.get(INPUT_TASK))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty());
    match detail {
        Some(d) => format!("{display_name}: {d}"),
        None => format!("Running {display_name}"),
    }
}
