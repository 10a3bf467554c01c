// Configuration structs

use super::constants::*;
use super::provider::ProviderEntry;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Writer role settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Model override (provider default if unset)
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Feed recurring critic feedback from past posts into the prompt
    pub learn_from_feedback: bool,
    /// How many past posts to mine for recurring feedback
    pub feedback_history_count: usize,
    /// Real posts shown to the writer as style reference
    pub example_post_count: usize,
    /// Write several first drafts in parallel and let the model pick one
    pub multi_draft_enabled: bool,
    /// Number of parallel first drafts (2-5)
    pub multi_draft_count: usize,
    /// Pick example posts by keyword overlap with the topic instead of at random
    pub semantic_matching: bool,
}

impl WriterConfig {
    /// First drafts per run: 1 unless multi-draft is on
    pub fn draft_count(&self) -> usize {
        if self.multi_draft_enabled {
            self.multi_draft_count
        } else {
            1
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: DEFAULT_WRITER_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            learn_from_feedback: true,
            feedback_history_count: DEFAULT_FEEDBACK_HISTORY_COUNT,
            example_post_count: 3,
            multi_draft_enabled: true,
            multi_draft_count: DEFAULT_MULTI_DRAFT_COUNT,
            semantic_matching: true,
        }
    }
}

/// Critic role settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticConfig {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Approvals scoring below this are downgraded to revisions
    pub min_score: Option<u8>,
    /// Accept a revise verdict on the last iteration when the score is high enough
    pub final_iteration_leniency: bool,
    pub final_iteration_min_score: u8,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: DEFAULT_CRITIC_TEMPERATURE,
            max_tokens: 2048,
            min_score: None,
            final_iteration_leniency: true,
            final_iteration_min_score: DEFAULT_FINAL_ITERATION_MIN_SCORE,
        }
    }
}

/// Loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementSettings {
    pub max_iterations: usize,
    /// Concurrent refinement runs when writing several topics at once
    pub concurrency: usize,
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: config_dir().join("postsmith.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset ("info", "debug", "postsmith=trace", ...)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM providers; the first entry is used for both roles
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub critic: CriticConfig,
    #[serde(default)]
    pub refinement: RefinementSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Config with the given providers and defaults everywhere else
    pub fn with_providers(providers: Vec<ProviderEntry>) -> Self {
        Self {
            providers,
            writer: WriterConfig::default(),
            critic: CriticConfig::default(),
            refinement: RefinementSettings::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// The provider used for writing and critiquing
    pub fn active_provider(&self) -> Option<&ProviderEntry> {
        self.providers.first()
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            bail!("No providers configured");
        }
        for entry in &self.providers {
            if entry.api_key().trim().is_empty() {
                bail!("Provider '{}' has an empty api_key", entry.display_name());
            }
        }
        if self.refinement.max_iterations == 0 {
            bail!("refinement.max_iterations must be at least 1");
        }
        if self.refinement.concurrency == 0 {
            bail!("refinement.concurrency must be at least 1");
        }
        for (role, temperature) in [
            ("writer", self.writer.temperature),
            ("critic", self.critic.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                bail!("{role}.temperature must be within 0.0..=2.0 (got {temperature})");
            }
        }
        if self.writer.multi_draft_enabled
            && !(2..=MAX_MULTI_DRAFT_COUNT).contains(&self.writer.multi_draft_count)
        {
            bail!(
                "writer.multi_draft_count must be within 2..={MAX_MULTI_DRAFT_COUNT} (got {})",
                self.writer.multi_draft_count
            );
        }
        if self.critic.min_score.is_some_and(|s| s > 100) {
            bail!("critic.min_score must be within 0..=100");
        }
        if self.critic.final_iteration_min_score > 100 {
            bail!("critic.final_iteration_min_score must be within 0..=100");
        }
        Ok(())
    }
}

/// `~/.postsmith`, or `./.postsmith` when no home directory is available
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_entry() -> ProviderEntry {
        ProviderEntry::Openai {
            api_key: "sk-test".to_string(),
            model: None,
            base_url: None,
            name: None,
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::with_providers(vec![openai_entry()]);
        assert_eq!(config.refinement.max_iterations, 10);
        assert_eq!(config.refinement.concurrency, 2);
        assert!(config.writer.learn_from_feedback);
        assert!(config.critic.final_iteration_leniency);
        assert_eq!(config.critic.final_iteration_min_score, 80);
        assert!(config.storage.db_path.ends_with("postsmith.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_no_providers() {
        let config = Config::with_providers(vec![]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config = Config::with_providers(vec![openai_entry()]);
        config.refinement.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = Config::with_providers(vec![openai_entry()]);
        config.critic.temperature = 3.5;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("critic.temperature"));
    }

    #[test]
    fn test_multi_draft_count() {
        let mut config = Config::with_providers(vec![openai_entry()]);
        assert_eq!(config.writer.draft_count(), 3);
        assert!(config.writer.semantic_matching);

        config.writer.multi_draft_count = 6;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("writer.multi_draft_count"));

        // ignored while multi-draft is off
        config.writer.multi_draft_enabled = false;
        assert!(config.validate().is_ok());
        assert_eq!(config.writer.draft_count(), 1);
    }

    #[test]
    fn test_validate_rejects_threshold_over_100() {
        let mut config = Config::with_providers(vec![openai_entry()]);
        config.critic.min_score = Some(120);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[providers]]
            type = "openai"
            api_key = "sk-1"

            [critic]
            min_score = 85

            [refinement]
            max_iterations = 3
        "#,
        )
        .unwrap();

        assert_eq!(config.critic.min_score, Some(85));
        assert!((config.critic.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.refinement.max_iterations, 3);
        assert_eq!(config.refinement.concurrency, 2);
        assert_eq!(config.logging.level, "info");
    }
}
