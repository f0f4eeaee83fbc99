// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use opsy_config::ToolsConfig;
use opsy_model::ToolSchema;

use crate::{DeclarativeTool, ExecTool, Tool, ToolDefinition, ToolError, ToolRunner, EXEC_TOOL_NAME};

/// Name-indexed set of executable tools.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in exec tool.
    pub fn with_exec(config: Arc<ToolsConfig>) -> Self {
        let mut reg = Self::new();
        reg.register(Tool::Exec(Arc::new(ExecTool::new(config))));
        reg
    }

    /// Load every `*.yaml` / `*.yml` definition in `dir` (not recursive) and
    /// add the built-in exec tool.
    ///
    /// Files that fail to parse or validate are skipped with a warning; only
    /// an unreadable directory fails the load.  The built-in exec tool takes
    /// precedence over a definition of the same name, and of two files with
    /// the same stem the first in sorted order wins.
    pub fn load(
        dir: &Path,
        config: Arc<ToolsConfig>,
        runner: Option<Arc<dyn ToolRunner>>,
    ) -> Result<Self, ToolError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|source| ToolError::LoadingTools { path: dir.to_path_buf(), source })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|p| p.is_file() && is_yaml(p))
            .collect();
        paths.sort();

        let exec = Arc::new(ExecTool::new(config));
        let mut reg = Self::new();
        for path in paths {
            let def = match ToolDefinition::from_file(&path).and_then(|d| d.validate().map(|_| d)) {
                Ok(def) => def,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping invalid tool definition");
                    continue;
                }
            };
            if def.name == EXEC_TOOL_NAME {
                warn!(path = %path.display(), "tool name `exec` is reserved for the built-in tool, ignoring definition");
                continue;
            }
            if reg.tools.contains_key(&def.name) {
                warn!(tool = %def.name, path = %path.display(), "duplicate tool name, keeping the first definition");
                continue;
            }
            debug!(tool = %def.name, path = %path.display(), "loaded tool definition");
            reg.register(Tool::Declarative(Arc::new(DeclarativeTool::new(def, exec.clone(), runner.clone()))));
        }
        reg.register(Tool::Exec(exec));

        info!(dir = %dir.display(), tools = reg.len(), "tools loaded");
        Ok(reg)
    }

    /// Add or replace a tool under its own name.
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Result<Tool, ToolError> {
        self.tools.get(name).cloned().ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn all(&self) -> &HashMap<String, Tool> {
        &self.tools
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for every tool, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(Tool::schema).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
