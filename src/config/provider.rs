// Provider entry: one configured LLM API

use serde::{Deserialize, Serialize};

/// A single provider entry.
///
/// Serializes with a `type` tag, e.g.:
/// ```toml
/// [[providers]]
/// type = "openai"
/// api_key = "sk-..."
/// model = "gpt-4o"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderEntry {
    Openai {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Claude {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Mistral {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Groq {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ProviderEntry {
    /// Human-readable name for log output.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Openai { name, .. } => name.as_deref().unwrap_or("OpenAI"),
            Self::Claude { name, .. } => name.as_deref().unwrap_or("Claude"),
            Self::Mistral { name, .. } => name.as_deref().unwrap_or("Mistral"),
            Self::Groq { name, .. } => name.as_deref().unwrap_or("Groq"),
        }
    }

    /// Short provider-type tag (e.g. "openai", "claude").
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::Openai { .. } => "openai",
            Self::Claude { .. } => "claude",
            Self::Mistral { .. } => "mistral",
            Self::Groq { .. } => "groq",
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            Self::Openai { api_key, .. }
            | Self::Claude { api_key, .. }
            | Self::Mistral { api_key, .. }
            | Self::Groq { api_key, .. } => api_key,
        }
    }
}
