// LLM provider support
//
// Both refinement roles talk to a language model through the same
// `LlmProvider` capability; only prompt construction and response parsing
// differ between them.

use anyhow::Result;
use async_trait::async_trait;

pub mod types;

// Provider implementations
pub mod claude;
pub mod openai;

pub mod factory;
pub mod retry;

pub use claude::ClaudeProvider;
pub use factory::create_provider_from_entry;
pub use openai::OpenAIProvider;
pub use retry::{with_retry, RetryPolicy};
pub use types::{Message, ProviderRequest, ProviderResponse};

/// Trait for LLM providers
///
/// Stateless request/response: given a prompt, returns generated text.
/// Timeouts and transport retries are handled inside the implementation.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a message and get a complete response
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Get the provider name (e.g., "openai", "claude")
    fn name(&self) -> &str;

    /// Get the default model for this provider
    fn default_model(&self) -> &str;
}
