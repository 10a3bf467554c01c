// Writer and Critic roles
//
// Both LLM-backed roles share one `LlmProvider` and differ only in how they
// build prompts and parse responses.

mod critic;
mod lessons;
mod policy;
mod writer;

pub use critic::{parse_verdict, LlmCritic};
pub use lessons::{extract_lessons, normalize_feedback, Lessons};
pub use policy::ApprovalPolicy;
pub use writer::{clean_post_text, LlmWriter};

use async_trait::async_trait;
use std::sync::Arc;

use crate::profile::StyleProfile;
use crate::providers::{LlmProvider, ProviderRequest};
use crate::refinement::{CriticVerdict, Draft, EvaluationError, GenerationError, Topic};

/// Example posts are cut to this many characters in prompts
const EXAMPLE_POST_MAX_CHARS: usize = 1200;

/// The previous round a revision is based on
#[derive(Debug, Clone, Copy)]
pub struct Revision<'a> {
    pub previous: &'a Draft,
    pub verdict: &'a CriticVerdict,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub topic: &'a Topic,
    pub profile: &'a StyleProfile,
    /// `None` for the first draft of a run
    pub revision: Option<Revision<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluateRequest<'a> {
    pub draft: &'a Draft,
    pub profile: &'a StyleProfile,
    pub topic: &'a Topic,
    /// 1-based
    pub iteration: usize,
    pub max_iterations: usize,
}

impl EvaluateRequest<'_> {
    pub fn is_final_iteration(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}

/// Produces post text. Must never return empty content.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, request: WriteRequest<'_>) -> Result<String, GenerationError>;
}

/// Scores a draft and decides approve or revise
#[async_trait]
pub trait Critic: Send + Sync {
    async fn evaluate(&self, request: EvaluateRequest<'_>) -> Result<CriticVerdict, EvaluationError>;
}

/// Model settings for one role
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Provider default when unset
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelParams {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: None,
            temperature,
            max_tokens,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    fn request(&self, system: String, user: String) -> ProviderRequest {
        let mut request = ProviderRequest::prompt(user)
            .with_system(system)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        request
    }
}

/// Send one prompt and return the raw response text
async fn invoke(provider: &Arc<dyn LlmProvider>, request: &ProviderRequest) -> anyhow::Result<String> {
    tracing::debug!(
        provider = provider.name(),
        model = request.model_or(provider.default_model()),
        "invoking LLM ({} chars of prompt)",
        request.messages.iter().map(|m| m.content.len()).sum::<usize>()
    );
    let response = provider.send_message(request).await?;
    tracing::debug!("LLM response {} ({} chars)", response.id, response.text.len());
    Ok(response.text)
}

/// Cut `text` to `max_chars` characters, marking the cut with "..."
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Strip leading/trailing markdown code fences (```json ... ``` or ``` ... ```)
fn strip_markdown_fences(s: &str) -> &str {
    let s = s.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

/// Numbered example posts for a prompt, or an empty string
fn examples_section(heading: &str, examples: &[&str]) -> String {
    if examples.is_empty() {
        return String::new();
    }
    let mut section = format!("\n\n{heading}\n");
    for (i, post) in examples.iter().enumerate() {
        section.push_str(&format!(
            "\n--- Example {} ---\n{}\n",
            i + 1,
            truncate_chars(post, EXAMPLE_POST_MAX_CHARS)
        ));
    }
    section.push_str("--- End of examples ---\n");
    section
}
