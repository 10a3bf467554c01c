// Unified request/response types for LLM providers
//
// The writer and critic roles only ever need plain text in and plain text
// out, so these types stay small: no tool calls, no streaming, no images.

use serde::{Deserialize, Serialize};

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Unified request format for all LLM providers
///
/// Each provider implementation transforms this into its own API format.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    /// Conversation messages
    pub messages: Vec<Message>,

    /// Model name (provider-specific). Empty means "use the provider default".
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// System prompt (sent as `system` for Claude, prepended as a
    /// `{"role":"system"}` message for OpenAI-compatible providers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Ask the provider to return a JSON object
    #[serde(skip)]
    pub json_mode: bool,
}

impl ProviderRequest {
    /// Create a new request from messages
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: String::new(),
            max_tokens: crate::config::constants::DEFAULT_MAX_TOKENS,
            system: None,
            temperature: None,
            json_mode: false,
        }
    }

    /// Single-turn request with one user message
    pub fn prompt(user: impl Into<String>) -> Self {
        Self::new(vec![Message::user(user)])
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    /// Resolve the model to send, falling back to the provider default
    pub fn model_or<'a>(&'a self, default_model: &'a str) -> &'a str {
        if self.model.is_empty() {
            default_model
        } else {
            &self.model
        }
    }
}

/// Unified response format from all LLM providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Response ID (provider-specific)
    pub id: String,

    /// Model that generated the response
    pub model: String,

    /// Concatenated text content
    pub text: String,

    /// Why generation stopped ("stop", "length", "end_turn", ...)
    pub finish_reason: Option<String>,

    /// Provider name that generated this response
    pub provider: String,
}
