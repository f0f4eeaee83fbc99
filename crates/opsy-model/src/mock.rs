// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{CompletionRequest, CompletionResponse, ModelError, Role, ToolUse};

/// Deterministic mock provider.  Echoes the last user message back as the
/// assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.text())
            .unwrap_or_else(|| "[no input]".to_string());
        Ok(CompletionResponse::text(format!("MOCK: {reply}")))
    }
}

/// One scripted backend reply.
#[derive(Debug, Clone)]
pub enum Script {
    Respond(CompletionResponse),
    /// Fail the call with an API error carrying this message.
    Fail(String),
}

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// script from the front of the queue, which lets tests specify exact
/// replies – including tool uses and backend failures – without network
/// access.
pub struct ScriptedMockProvider {
    scripts: Mutex<VecDeque<Script>>,
    delay: Option<Duration>,
    /// Every `CompletionRequest` seen by this provider, in call order.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build a provider that answers successive calls with `responses`.
    pub fn from_responses(responses: Vec<CompletionResponse>) -> Self {
        Self::new(responses.into_iter().map(Script::Respond).collect())
    }

    /// Sleep before answering each call; used to exercise cancellation of an
    /// in-flight backend call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::from_responses(vec![CompletionResponse::text(reply)])
    }

    /// Convenience: provider that returns one tool use followed by a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::from_responses(vec![
            CompletionResponse::tool_uses(vec![ToolUse {
                id: tool_id.into(),
                name: tool_name.into(),
                input,
            }]),
            CompletionResponse::text(final_text),
        ])
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Snapshot of the recorded requests.
    pub fn recorded(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(req);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.scripts.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match next {
            Some(Script::Respond(resp)) => Ok(resp),
            Some(Script::Fail(message)) => Err(ModelError::Api { status: 500, message }),
            // Default fallback when all scripts are consumed
            None => Ok(CompletionResponse::text("[no more scripts]")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
