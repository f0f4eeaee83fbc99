use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lines kept from each end of an oversized output.
const KEEP_LINES: usize = 100;

/// Record of one shell command run by the exec tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedCommand {
    pub command: String,
    pub working_directory: String,
    /// Process exit code; -1 when the process never started or was killed.
    pub exit_code: i32,
    /// Combined stdout and stderr captured so far.
    pub output: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutedCommand {
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}

/// Result payload of a tool execution: captured text for the exec tool, the
/// final answer of a nested run for declarative tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    Text(String),
    Structured(Value),
}

impl ToolResult {
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Structured(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(t) => t.is_empty(),
            Self::Structured(v) => v.is_null(),
        }
    }
}

impl Default for ToolResult {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(t) => f.write_str(t),
            Self::Structured(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for ToolResult {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl PartialEq<str> for ToolResult {
    fn eq(&self, other: &str) -> bool {
        self.as_text() == Some(other)
    }
}

impl PartialEq<&str> for ToolResult {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

/// What a tool execution produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub tool: String,
    pub result: ToolResult,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_command: Option<ExecutedCommand>,
}

impl Output {
    pub fn new(tool: impl Into<String>, result: impl Into<String>) -> Self {
        Self { tool: tool.into(), result: ToolResult::Text(result.into()), ..Self::default() }
    }

    pub fn error(tool: impl Into<String>, result: impl Into<String>) -> Self {
        Self { is_error: true, ..Self::new(tool, result) }
    }
}

/// Shorten `s` to roughly `limit` bytes for the model.
///
/// Oversized output keeps its first and last lines with an omission marker
/// in the middle, so both the command header and the trailing errors stay
/// visible.  When those lines alone exceed the budget, the output is cut on character
/// boundaries instead.
pub fn head_tail_truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total > KEEP_LINES * 2 {
        let head = lines[..KEEP_LINES].join("\n");
        let tail = lines[total - KEEP_LINES..].join("\n");
        if head.len() + tail.len() <= limit {
            let omitted_lines = total - KEEP_LINES * 2;
            let omitted_bytes = s.len().saturating_sub(head.len() + tail.len());
            return format!("{head}\n...[{omitted_lines} lines / ~{omitted_bytes} bytes omitted]...\n{tail}");
        }
    }

    // Few lines, or lines too long for the budget: cut on bytes.
    let half = limit / 2;
    let head_end = floor_char_boundary(s, half);
    let tail_start = ceil_char_boundary(s, s.len() - half);
    let omitted = tail_start.saturating_sub(head_end);
    format!("{}\n...[{omitted} bytes omitted]...\n{}", &s[..head_end], &s[tail_start..])
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(head_tail_truncate("hello\n", 100), "hello\n");
    }

    #[test]
    fn long_output_keeps_head_and_tail_lines() {
        let text: String = (0..1000).map(|i| format!("line {i}\n")).collect();
        let out = head_tail_truncate(&text, 2_000);
        assert!(out.starts_with("line 0\n"));
        assert!(out.ends_with("line 999"));
        assert!(out.contains("800 lines"));
        assert!(!out.contains("line 500\n"));
    }

    #[test]
    fn long_lines_are_cut_on_char_boundaries() {
        let text = "ä".repeat(5_000);
        let out = head_tail_truncate(&text, 1_001);
        assert!(out.contains("bytes omitted"));
        assert!(out.len() < text.len());
    }

    #[test]
    fn many_long_lines_stay_within_limit() {
        let line = "x".repeat(999);
        let text: String = (0..250).map(|i| format!("{i:03}{line}\n")).collect();
        let out = head_tail_truncate(&text, 20_000);
        assert!(out.len() <= 20_000 + 64, "output was {} bytes", out.len());
        assert!(out.starts_with("000x"));
        assert!(out.trim_end().ends_with('x'));
        assert!(out.contains("bytes omitted"));
    }

    #[test]
    fn result_compares_with_str() {
        let r = ToolResult::Text("hello\n".into());
        assert_eq!(r, "hello\n");
        assert!(ToolResult::empty().is_empty());
        assert!(ToolResult::Structured(json!({"a": 1})).as_text().is_none());
    }

    #[test]
    fn structured_result_serializes_untagged() {
        let out = Output {
            tool: "k8s".into(),
            result: ToolResult::Structured(json!({"pods": 3})),
            ..Output::default()
        };
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["result"], json!({"pods": 3}));
        assert!(v.get("executed_command").is_none());
    }

    #[test]
    fn duration_requires_both_timestamps() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut cmd = ExecutedCommand {
            command: "true".into(),
            working_directory: ".".into(),
            exit_code: 0,
            output: String::new(),
            started_at: Some(start),
            completed_at: None,
        };
        assert!(cmd.duration().is_none());
        cmd.completed_at = Some(start + chrono::Duration::seconds(2));
        assert_eq!(cmd.duration(), Some(chrono::Duration::seconds(2)));
    }
}
