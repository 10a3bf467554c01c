// Provider factory
//
// Creates LLM providers from configuration entries

use anyhow::Result;

use super::claude::ClaudeProvider;
use super::openai::OpenAIProvider;
use super::LlmProvider;
use crate::config::ProviderEntry;

/// Create an `LlmProvider` from a configured `ProviderEntry`.
pub fn create_provider_from_entry(entry: &ProviderEntry) -> Result<Box<dyn LlmProvider>> {
    match entry {
        ProviderEntry::Openai {
            api_key,
            model,
            base_url,
            ..
        } => {
            let mut provider = OpenAIProvider::new_openai(api_key.clone())?;
            if let Some(url) = base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let Some(m) = model {
                provider = provider.with_model(m.clone());
            }
            Ok(Box::new(provider))
        }

        ProviderEntry::Claude {
            api_key,
            model,
            base_url,
            ..
        } => {
            let mut provider = ClaudeProvider::new(api_key.clone())?;
            if let Some(url) = base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let Some(m) = model {
                provider = provider.with_model(m.clone());
            }
            Ok(Box::new(provider))
        }

        ProviderEntry::Mistral { api_key, model, .. } => {
            let mut provider = OpenAIProvider::new_mistral(api_key.clone())?;
            if let Some(m) = model {
                provider = provider.with_model(m.clone());
            }
            Ok(Box::new(provider))
        }

        ProviderEntry::Groq { api_key, model, .. } => {
            let mut provider = OpenAIProvider::new_groq(api_key.clone())?;
            if let Some(m) = model {
                provider = provider.with_model(m.clone());
            }
            Ok(Box::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_openai_with_model_override() {
        let entry = ProviderEntry::Openai {
            api_key: "sk-test".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            base_url: None,
            name: None,
        };
        let provider = create_provider_from_entry(&entry).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "gpt-4o-mini");
    }

    #[test]
    fn test_create_claude() {
        let entry = ProviderEntry::Claude {
            api_key: "sk-ant-test".to_string(),
            model: None,
            base_url: None,
            name: None,
        };
        let provider = create_provider_from_entry(&entry).unwrap();
        assert_eq!(provider.name(), "claude");
    }

    #[test]
    fn test_create_groq() {
        let entry = ProviderEntry::Groq {
            api_key: "gsk-test".to_string(),
            model: None,
            name: None,
        };
        let provider = create_provider_from_entry(&entry).unwrap();
        assert_eq!(provider.name(), "groq");
    }
}
