// Configuration loader
// Loads ~/.postsmith/config.toml (or $POSTSMITH_CONFIG), falling back to
// API keys in the environment.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::provider::ProviderEntry;
use super::settings::{config_dir, Config};

/// Environment variable pointing at an alternative config file
pub const CONFIG_PATH_ENV: &str = "POSTSMITH_CONFIG";

/// Load configuration from the config file or environment
pub fn load_config() -> Result<Config> {
    let path = config_path();
    if let Some(config) = load_config_file(&path)? {
        return Ok(config);
    }

    if let Some(config) = config_from_env() {
        tracing::debug!("No config file at {}, using environment", path.display());
        config.validate().context("Configuration validation failed")?;
        return Ok(config);
    }

    bail!(
        "No configuration found.\n\n\
        Create {} with at least one provider:\n\n\
        [[providers]]\n\
        type = \"openai\"\n\
        api_key = \"sk-...\"\n\n\
        Alternatively, set an environment variable:\n\
        export OPENAI_API_KEY=\"sk-...\"",
        path.display()
    );
}

/// Resolved config file location
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join("config.toml"))
}

/// Parse and validate a config file. `Ok(None)` when the file does not exist.
pub fn load_config_file(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(Some(config))
}

fn config_from_env() -> Option<Config> {
    let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

    if let Some(api_key) = non_empty("OPENAI_API_KEY") {
        return Some(Config::with_providers(vec![ProviderEntry::Openai {
            api_key,
            model: None,
            base_url: None,
            name: Some("OpenAI (Environment)".to_string()),
        }]));
    }

    if let Some(api_key) = non_empty("ANTHROPIC_API_KEY") {
        return Some(Config::with_providers(vec![ProviderEntry::Claude {
            api_key,
            model: None,
            base_url: None,
            name: Some("Claude (Environment)".to_string()),
        }]));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_is_none() {
        let result = load_config_file(Path::new("/nonexistent/postsmith/config.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[providers]]
type = "openai"
api_key = "sk-file"
model = "gpt-4o-mini"

[writer]
temperature = 0.9

[storage]
db_path = "/tmp/postsmith-test.db"
"#
        )
        .unwrap();

        let config = load_config_file(file.path()).unwrap().unwrap();
        assert_eq!(config.providers.len(), 1);
        assert!((config.writer.temperature - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/postsmith-test.db"));
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[refinement]\nmax_iterations = 5").unwrap();

        let err = load_config_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("No providers configured"));
    }

    #[test]
    fn test_malformed_toml_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is = = not toml").unwrap();

        let err = load_config_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
