// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
mod error;
mod definition;
mod output;
mod exec;
mod declarative;
mod tool;
mod registry;

pub use error::ToolError;
pub use definition::{ToolDefinition, ToolInput, INPUT_TASK, INPUT_WORKING_DIRECTORY};
pub use output::{head_tail_truncate, ExecutedCommand, Output, ToolResult};
pub use exec::{ExecTool, EXEC_TOOL_NAME, INPUT_COMMAND};
pub use declarative::{DeclarativeTool, ToolRunRequest, ToolRunner};
pub use tool::{Tool, ToolInputs};
pub use registry::ToolRegistry;
