use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use opsy_config::AnthropicConfig;

use crate::{CompletionRequest, CompletionResponse, ContentBlock, ModelError, StopReason, Usage};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        model: String,
        api_key: String,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.anthropic.com".into()),
            max_tokens: max_tokens.unwrap_or(1024),
            temperature: temperature.unwrap_or(0.5),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &AnthropicConfig) -> Result<Self, ModelError> {
        let key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ModelError::MissingApiKey)?;
        Ok(Self::new(
            cfg.model.clone(),
            key,
            Some(cfg.base_url.clone()),
            Some(cfg.max_tokens),
            Some(cfg.temperature),
        ))
    }

    pub(crate) fn request_body(&self, req: &CompletionRequest) -> Value {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": req.messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if let Some(system) = req.system.as_deref().filter(|s| !s.is_empty()) {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }
}

#[async_trait]
impl crate::ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        let body = self.request_body(&req);

        debug!(model = %self.model, messages = req.messages.len(), tools = req.tools.len(), "sending anthropic request");

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api { status: status.as_u16(), message: error_message(&text) });
        }

        let v: Value = resp.json().await?;
        parse_response(&v)
    }
}

/// Extract `error.message` from an Anthropic error body, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

pub(crate) fn parse_response(v: &Value) -> Result<CompletionResponse, ModelError> {
    let blocks = v["content"]
        .as_array()
        .ok_or_else(|| ModelError::Decode("missing `content` array".into()))?;

    let mut content = Vec::with_capacity(blocks.len());
    for block in blocks {
        let kind = block["type"].as_str().unwrap_or("");
        match kind {
            "text" | "tool_use" => {
                let parsed: ContentBlock = serde_json::from_value(block.clone())
                    .map_err(|e| ModelError::Decode(format!("{kind} block: {e}")))?;
                content.push(parsed);
            }
            // Thinking and other block types carry nothing the engine acts on.
            other => debug!(block_type = other, "skipping unsupported content block"),
        }
    }

    let stop_reason = v
        .get("stop_reason")
        .filter(|s| !s.is_null())
        .map(|s| serde_json::from_value::<StopReason>(s.clone()))
        .transpose()
        .map_err(|e| ModelError::Decode(format!("stop_reason: {e}")))?;
    let usage = v
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
        .unwrap_or_default();

    Ok(CompletionResponse { content, stop_reason, usage })
}
