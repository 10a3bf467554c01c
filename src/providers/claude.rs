// Anthropic messages API provider

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::{with_retry, RetryPolicy};
use super::types::{Message, ProviderRequest, ProviderResponse};
use super::LlmProvider;

const CLAUDE_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Instruction appended to the system prompt in JSON mode; the messages API
/// has no `response_format` switch.
const JSON_MODE_SUFFIX: &str = "\n\nRespond with a single JSON object and nothing else.";

#[derive(Clone)]
pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    retry: RetryPolicy,
}

impl ClaudeProvider {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: CLAUDE_API_URL.to_string(),
            default_model: "claude-sonnet-4-20250514".to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn to_claude_request<'a>(&'a self, request: &'a ProviderRequest) -> ClaudeRequest<'a> {
        let system = match (&request.system, request.json_mode) {
            (Some(system), true) => Some(format!("{system}{JSON_MODE_SUFFIX}")),
            (Some(system), false) => Some(system.clone()),
            (None, true) => Some(JSON_MODE_SUFFIX.trim_start().to_string()),
            (None, false) => None,
        };

        ClaudeRequest {
            model: request.model_or(&self.default_model),
            max_tokens: request.max_tokens,
            system,
            temperature: request.temperature,
            messages: &request.messages,
        }
    }

    /// Send a single message request (no retry)
    async fn send_message_once(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let body = self.to_claude_request(request);
        tracing::debug!("Sending request to Claude API ({})", body.model);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Claude API")?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Claude API request failed\n\nStatus: {}\nBody: {}",
                status,
                error_body
            );
        }

        let message_response: ClaudeResponse = response
            .json()
            .await
            .context("Failed to parse Claude API response")?;

        tracing::debug!("Received response {}", message_response.id);

        Ok(message_response.into_provider_response())
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        with_retry(self.retry, || self.send_message_once(request)).await
    }

    fn name(&self) -> &str {
        "claude"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl ClaudeResponse {
    fn into_provider_response(self) -> ProviderResponse {
        let text = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        ProviderResponse {
            id: self.id,
            model: self.model,
            text,
            finish_reason: self.stop_reason,
            provider: "claude".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let provider = ClaudeProvider::new("test-key".to_string());
        assert!(provider.is_ok());
    }

    #[test]
    fn test_json_mode_extends_system_prompt() {
        let provider = ClaudeProvider::new("k".to_string()).unwrap();
        let request = ProviderRequest::prompt("score it")
            .with_system("You are an editor.")
            .with_json_mode(true);

        let body = provider.to_claude_request(&request);
        let system = body.system.unwrap();
        assert!(system.starts_with("You are an editor."));
        assert!(system.ends_with("nothing else."));
    }

    #[test]
    fn test_response_joins_text_blocks() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "second"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let response: ClaudeResponse = serde_json::from_str(raw).unwrap();
        let converted = response.into_provider_response();
        assert_eq!(converted.text, "first\nsecond");
        assert_eq!(converted.finish_reason.as_deref(), Some("end_turn"));
    }
}
