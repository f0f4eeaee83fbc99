// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ToolError;

/// Input every tool accepts: the work to perform, in natural language.
pub const INPUT_TASK: &str = "task";
/// Input every tool accepts: where commands run.  Defaults to `"."`.
pub const INPUT_WORKING_DIRECTORY: &str = "working_directory";

/// One named input of a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    /// JSON schema type name (`string`, `number`, `integer`, `boolean`,
    /// `array`, `object`).
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    #[serde(default)]
    pub optional: bool,
}

impl ToolInput {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self { kind: kind.into(), description: description.into(), ..Self::default() }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_examples(mut self, examples: Vec<Value>) -> Self {
        self.examples = examples;
        self
    }

    /// Whether `value` is acceptable for this input's declared type.
    /// Unknown type names accept anything.
    pub fn accepts(&self, value: &Value) -> bool {
        match self.kind.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        }
    }

    fn to_schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.kind));
        prop.insert("description".into(), json!(self.description));
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.clone());
        }
        if !self.examples.is_empty() {
            prop.insert("examples".into(), json!(self.examples));
        }
        Value::Object(prop)
    }
}

/// A tool described in a YAML file.  The tool's name is the file stem and
/// is not part of the document.
///
/// ```yaml
/// display_name: Kubernetes
/// description: Inspects and manages Kubernetes clusters.
/// system_prompt: You are a Kubernetes expert...
/// executable: kubectl
/// inputs:
///   namespace:
///     type: string
///     description: Namespace to operate in
///     default: default
///     optional: true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, ToolInput>,
}

impl ToolDefinition {
    /// Read and parse a definition file.  Does not validate.
    pub fn from_file(path: &Path) -> Result<Self, ToolError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ToolError::Read { path: path.to_path_buf(), source })?;
        let mut def: ToolDefinition = serde_yaml::from_str(&text)
            .map_err(|source| ToolError::Parse { path: path.to_path_buf(), source })?;
        def.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(def)
    }

    /// Check the definition is complete.  Checks run in a fixed order:
    /// display name, description, inputs (by name), executable.
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.display_name.trim().is_empty() {
            return Err(ToolError::MissingDisplayName);
        }
        if self.description.trim().is_empty() {
            return Err(ToolError::MissingDescription);
        }
        for (name, input) in &self.inputs {
            if input.kind.trim().is_empty() {
                return Err(ToolError::InputMissingType(name.clone()));
            }
            if input.description.trim().is_empty() {
                return Err(ToolError::InputMissingDescription(name.clone()));
            }
        }
        if let Some(exe) = self.executable.as_deref() {
            which::which(exe).map_err(|_| ToolError::ExecutableNotFound(exe.to_string()))?;
        }
        Ok(())
    }

    /// Declared inputs plus the reserved `task` and `working_directory`.
    /// Reserved inputs replace declared ones of the same name.
    pub fn resolved_inputs(&self) -> BTreeMap<String, ToolInput> {
        let mut inputs = self.inputs.clone();
        inputs.insert(
            INPUT_TASK.into(),
            ToolInput::new("string", "The task to perform, described in natural language"),
        );
        inputs.insert(
            INPUT_WORKING_DIRECTORY.into(),
            ToolInput::new("string", "The directory to run commands in")
                .with_default(json!("."))
                .optional(),
        );
        inputs
    }

    /// JSON schema presented to the model.  Properties and the `required`
    /// list are emitted in name order so the output is stable.
    pub fn input_schema(&self) -> Value {
        let inputs = self.resolved_inputs();
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, input) in &inputs {
            properties.insert(name.clone(), input.to_schema());
            if !input.optional {
                required.push(json!(name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ToolDefinition {
        ToolDefinition {
            name: "test".into(),
            display_name: "Test".into(),
            description: "A test tool".into(),
            ..ToolDefinition::default()
        }
    }

    #[test]
    fn complete_definition_validates() {
        let mut def = valid();
        def.inputs.insert("path".into(), ToolInput::new("string", "A path"));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn validation_order_and_messages() {
        let mut def = valid();
        def.inputs.insert("test_input".into(), ToolInput::default());
        let err = def.validate().unwrap_err();
        assert!(matches!(err, ToolError::InputMissingType(ref n) if n == "test_input"));
        assert_eq!(err.to_string(), "tool input is missing type: \"test_input\"");

        def.inputs.insert("test_input".into(), ToolInput { kind: "string".into(), ..ToolInput::default() });
        let err = def.validate().unwrap_err();
        assert!(matches!(err, ToolError::InputMissingDescription(ref n) if n == "test_input"));

        // Display name is checked before inputs, description before inputs too.
        def.display_name.clear();
        assert!(matches!(def.validate(), Err(ToolError::MissingDisplayName)));
        def.display_name = "Test".into();
        def.description.clear();
        assert!(matches!(def.validate(), Err(ToolError::MissingDescription)));
    }

    #[test]
    fn unknown_executable_is_rejected() {
        let mut def = valid();
        def.executable = Some("definitely-not-a-real-binary-opsy".into());
        assert!(matches!(def.validate(), Err(ToolError::ExecutableNotFound(_))));
    }

    #[test]
    fn executable_on_path_is_accepted() {
        let mut def = valid();
        def.executable = Some("sh".into());
        assert!(def.validate().is_ok());
    }

    #[test]
    fn schema_always_has_task_and_working_directory() {
        let schema = valid().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["task"]["type"], "string");
        assert_eq!(schema["properties"]["working_directory"]["default"], ".");
        assert_eq!(schema["required"], json!(["task"]));
    }

    #[test]
    fn schema_required_list_is_sorted_and_skips_optional() {
        let mut def = valid();
        def.inputs.insert("zone".into(), ToolInput::new("string", "Zone"));
        def.inputs.insert("app".into(), ToolInput::new("string", "App"));
        def.inputs.insert("replicas".into(), ToolInput::new("integer", "Count").optional());
        let schema = def.input_schema();
        assert_eq!(schema["required"], json!(["app", "task", "zone"]));
        let keys: Vec<&String> = schema["properties"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["app", "replicas", "task", "working_directory", "zone"]);
    }

    #[test]
    fn reserved_inputs_override_declared_ones() {
        let mut def = valid();
        def.inputs.insert("task".into(), ToolInput::new("integer", "Not really a task").optional());
        let inputs = def.resolved_inputs();
        assert_eq!(inputs["task"].kind, "string");
        assert!(!inputs["task"].optional);
    }

    #[test]
    fn input_type_checks() {
        assert!(ToolInput::new("string", "").accepts(&json!("x")));
        assert!(!ToolInput::new("string", "").accepts(&json!(1)));
        assert!(ToolInput::new("integer", "").accepts(&json!(3)));
        assert!(!ToolInput::new("integer", "").accepts(&json!(3.5)));
        assert!(ToolInput::new("number", "").accepts(&json!(3.5)));
        assert!(ToolInput::new("boolean", "").accepts(&json!(true)));
        assert!(ToolInput::new("custom", "").accepts(&json!(null)));
    }

    #[test]
    fn yaml_document_parses_with_name_from_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k8s.yaml");
        std::fs::write(
            &path,
            "display_name: Kubernetes\ndescription: Manage clusters\ninputs:\n  namespace:\n    type: string\n    description: Namespace\n    default: default\n    optional: true\n",
        )
        .unwrap();
        let def = ToolDefinition::from_file(&path).unwrap();
        assert_eq!(def.name, "k8s");
        assert_eq!(def.display_name, "Kubernetes");
        assert_eq!(def.inputs["namespace"].default, Some(json!("default")));
        assert!(def.inputs["namespace"].optional);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "display_name: [unclosed\n").unwrap();
        assert!(matches!(ToolDefinition::from_file(&path), Err(ToolError::Parse { .. })));
    }
}
