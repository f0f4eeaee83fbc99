// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::definition::{ToolDefinition, INPUT_TASK, INPUT_WORKING_DIRECTORY};
use crate::{ExecTool, Output, ToolError, ToolInputs, ToolRegistry, ToolResult};

/// A nested agent run requested by a declarative tool.
#[derive(Debug)]
pub struct ToolRunRequest {
    /// Name of the tool on whose behalf the run happens.
    pub tool: String,
    pub system_prompt: String,
    pub task: String,
    /// Tools available to the nested run (the exec tool only).
    pub tools: ToolRegistry,
}

/// Executes nested agent runs for declarative tools.  Implemented by the
/// agent engine; the tools crate only knows this seam.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the request to completion and return the final answer text.
    async fn run_tool(&self, request: ToolRunRequest, cancel: CancellationToken) -> anyhow::Result<String>;
}

/// A tool defined in YAML.  Executing it validates the inputs and hands the
/// task to a [`ToolRunner`] with the tool's system prompt and the exec tool.
pub struct DeclarativeTool {
    definition: ToolDefinition,
    schema: Value,
    exec: Arc<ExecTool>,
    runner: Option<Arc<dyn ToolRunner>>,
}

impl fmt::Debug for DeclarativeTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarativeTool")
            .field("definition", &self.definition)
            .field("runner", &self.runner.is_some())
            .finish()
    }
}

impl DeclarativeTool {
    pub fn new(definition: ToolDefinition, exec: Arc<ExecTool>, runner: Option<Arc<dyn ToolRunner>>) -> Self {
        let schema = definition.input_schema();
        Self { definition, schema, exec, runner }
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub fn input_schema(&self) -> &Value {
        &self.schema
    }

    pub async fn execute(&self, inputs: &ToolInputs, cancel: &CancellationToken) -> Result<Output, ToolError> {
        let name = self.definition.name.clone();
        let task = match inputs.get(INPUT_TASK) {
            Some(Value::String(t)) => t.clone(),
            _ => return Err(invalid(INPUT_TASK, "string")),
        };
        let working_directory = match inputs.get(INPUT_WORKING_DIRECTORY) {
            None | Some(Value::Null) => ".".to_string(),
            Some(Value::String(d)) => d.clone(),
            Some(_) => return Err(invalid(INPUT_WORKING_DIRECTORY, "string")),
        };
        let resolved = self.resolve_inputs(inputs)?;

        let Some(runner) = self.runner.clone() else {
            return Err(ToolError::RunnerUnavailable(name));
        };

        let mut tools = ToolRegistry::new();
        tools.register(crate::Tool::Exec(self.exec.clone()));
        let request = ToolRunRequest {
            tool: name.clone(),
            system_prompt: self.system_prompt(&working_directory),
            task: render_task(&task, &resolved),
            tools,
        };

        debug!(tool = %name, "delegating to nested run");
        match runner.run_tool(request, cancel.clone()).await {
            Ok(answer) => Ok(Output {
                tool: name,
                result: ToolResult::Text(answer),
                is_error: false,
                executed_command: None,
            }),
            Err(e) => {
                warn!(tool = %name, error = %e, "nested run failed");
                let message = format!("{e:#}");
                let output = Output::error(name, message.clone());
                Err(ToolError::Run { message, output: Box::new(output) })
            }
        }
    }

    /// Type-check provided inputs, fill defaults and require the rest.
    fn resolve_inputs(&self, inputs: &ToolInputs) -> Result<BTreeMap<String, Value>, ToolError> {
        let mut resolved = BTreeMap::new();
        for (name, declared) in &self.definition.inputs {
            if name == INPUT_TASK || name == INPUT_WORKING_DIRECTORY {
                continue;
            }
            match inputs.get(name).filter(|v| !v.is_null()) {
                Some(value) if declared.accepts(value) => {
                    resolved.insert(name.clone(), value.clone());
                }
                Some(_) => return Err(invalid(name, &declared.kind)),
                None => match &declared.default {
                    Some(default) => {
                        resolved.insert(name.clone(), default.clone());
                    }
                    None if declared.optional => {}
                    None => return Err(ToolError::MissingInput(name.clone())),
                },
            }
        }
        Ok(resolved)
    }

    fn system_prompt(&self, working_directory: &str) -> String {
        let def = &self.definition;
        let mut prompt = match def.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(p) => p.trim_end().to_string(),
            None => format!("You are {}. {}", def.display_name, def.description),
        };
        if let Some(exe) = &def.executable {
            prompt.push_str(&format!(
                "\n\nUse the `{exe}` executable through the exec tool to carry out the task."
            ));
        }
        prompt.push_str(&format!(
            "\n\nRun commands in the working directory `{working_directory}`. When done, reply with \
             the result of the task only."
        ));
        prompt
    }
}

fn invalid(input: &str, expected: &str) -> ToolError {
    ToolError::InvalidInputType { input: input.to_string(), expected: expected.to_string() }
}

fn render_task(task: &str, inputs: &BTreeMap<String, Value>) -> String {
    if inputs.is_empty() {
        return task.to_string();
    }
    let mut out = format!("{task}\n\nInputs:");
    for (name, value) in inputs {
        match value {
            Value::String(s) => out.push_str(&format!("\n- {name}: {s}")),
            other => out.push_str(&format!("\n- {name}: {other}")),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use opsy_config::ToolsConfig;
    use serde_json::json;

    use super::*;
    use crate::ToolInput;

    /// Records requests and answers with a fixed reply (or failure).
    struct RecordingRunner {
        reply: Result<String, String>,
        seen: Mutex<Vec<(String, String, String, Vec<String>)>>,
    }

    impl RecordingRunner {
        fn answering(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(reply.into()), seen: Mutex::new(Vec::new()) })
        }
        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self { reply: Err(message.into()), seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl ToolRunner for RecordingRunner {
        async fn run_tool(&self, request: ToolRunRequest, _cancel: CancellationToken) -> anyhow::Result<String> {
            self.seen.lock().unwrap().push((
                request.tool,
                request.system_prompt,
                request.task,
                request.tools.names(),
            ));
            self.reply.clone().map_err(|m| anyhow::anyhow!(m))
        }
    }

    fn definition() -> ToolDefinition {
        let mut def = ToolDefinition {
            name: "k8s".into(),
            display_name: "Kubernetes".into(),
            description: "Manages clusters".into(),
            system_prompt: Some("You are a Kubernetes expert.".into()),
            executable: Some("sh".into()),
            ..ToolDefinition::default()
        };
        def.inputs.insert("namespace".into(), ToolInput::new("string", "Namespace").with_default(json!("default")));
        def.inputs.insert("replicas".into(), ToolInput::new("integer", "Replica count"));
        def.inputs.insert("label".into(), ToolInput::new("string", "Label").optional());
        def
    }

    fn tool(runner: Option<Arc<dyn ToolRunner>>) -> DeclarativeTool {
        let exec = Arc::new(ExecTool::new(Arc::new(ToolsConfig::default())));
        DeclarativeTool::new(definition(), exec, runner)
    }

    fn inputs(v: Value) -> ToolInputs {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn delegates_with_prompt_inputs_and_exec_tool() {
        let runner = RecordingRunner::answering("3 pods running");
        let t = tool(Some(runner.clone() as Arc<dyn ToolRunner>));
        let out = t
            .execute(&inputs(json!({"task": "count pods", "replicas": 3})), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.tool, "k8s");
        assert_eq!(out.result, "3 pods running");
        assert!(!out.is_error);
        assert!(out.executed_command.is_none());

        let seen = runner.seen.lock().unwrap();
        let (name, prompt, task, tools) = &seen[0];
        assert_eq!(name, "k8s");
        assert!(prompt.starts_with("You are a Kubernetes expert."));
        assert!(prompt.contains("`sh` executable"));
        assert!(prompt.contains("working directory `.`"));
        assert_eq!(task, "count pods\n\nInputs:\n- namespace: default\n- replicas: 3");
        assert_eq!(tools, &vec!["exec".to_string()]);
    }

    #[tokio::test]
    async fn missing_required_input_is_rejected() {
        let runner = RecordingRunner::answering("unused");
        let t = tool(Some(runner.clone() as Arc<dyn ToolRunner>));
        let err = t.execute(&inputs(json!({"task": "count pods"})), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingInput(ref n) if n == "replicas"));
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrongly_typed_input_is_rejected() {
        let t = tool(Some(RecordingRunner::answering("unused") as Arc<dyn ToolRunner>));
        let err = t
            .execute(&inputs(json!({"task": "x", "replicas": "three"})), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInputType { ref input, ref expected } if input == "replicas" && expected == "integer"));

        let err = t.execute(&inputs(json!({"replicas": 1})), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInputType { ref input, .. } if input == "task"));
    }

    #[tokio::test]
    async fn runner_failure_becomes_error_output() {
        let t = tool(Some(RecordingRunner::failing("backend exploded") as Arc<dyn ToolRunner>));
        let err = t
            .execute(&inputs(json!({"task": "x", "replicas": 1})), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Run { .. }));
        let out = err.output().unwrap();
        assert!(out.is_error);
        assert_eq!(out.result, "backend exploded");
    }

    #[tokio::test]
    async fn missing_runner_is_reported() {
        let t = tool(None);
        let err = t
            .execute(&inputs(json!({"task": "x", "replicas": 1})), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::RunnerUnavailable(ref n) if n == "k8s"));
    }

    #[test]
    fn prompt_falls_back_to_display_name_and_description() {
        let mut def = definition();
        def.system_prompt = None;
        def.executable = None;
        let exec = Arc::new(ExecTool::new(Arc::new(ToolsConfig::default())));
        let t = DeclarativeTool::new(def, exec, None);
        let prompt = t.system_prompt("/srv");
        assert!(prompt.starts_with("You are Kubernetes. Manages clusters"));
        assert!(!prompt.contains("executable"));
        assert!(prompt.contains("`/srv`"));
    }
}
