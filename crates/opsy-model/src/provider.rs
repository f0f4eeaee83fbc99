use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse, ModelError};

/// Request/response contract of a language-model backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send the full conversation plus tool schemas and wait for one reply.
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, ModelError>;
}
