use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use opsy_model::ToolSchema;

use crate::{DeclarativeTool, ExecTool, Output, ToolDefinition, ToolError};

/// Named inputs of one tool execution, as sent by the model.
pub type ToolInputs = Map<String, Value>;

/// A tool the agent can execute.  Cloning is cheap.
#[derive(Clone)]
pub enum Tool {
    Exec(Arc<ExecTool>),
    Declarative(Arc<DeclarativeTool>),
}

impl Tool {
    pub fn definition(&self) -> &ToolDefinition {
        match self {
            Self::Exec(t) => t.definition(),
            Self::Declarative(t) => t.definition(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition().name
    }

    pub fn display_name(&self) -> &str {
        &self.definition().display_name
    }

    pub fn description(&self) -> &str {
        &self.definition().description
    }

    pub fn input_schema(&self) -> &Value {
        match self {
            Self::Exec(t) => t.input_schema(),
            Self::Declarative(t) => t.input_schema(),
        }
    }

    /// Schema as presented to the model backend.
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema().clone(),
        }
    }

    pub async fn execute(&self, inputs: &ToolInputs, cancel: &CancellationToken) -> Result<Output, ToolError> {
        match self {
            Self::Exec(t) => t.execute(inputs, cancel).await,
            Self::Declarative(t) => t.execute(inputs, cancel).await,
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Exec(_) => "exec",
            Self::Declarative(_) => "declarative",
        };
        f.debug_struct("Tool").field("kind", &kind).field("name", &self.name()).finish()
    }
}
