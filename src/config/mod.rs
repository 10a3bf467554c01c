// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod provider;
mod settings;

pub use loader::{config_path, load_config, load_config_file, CONFIG_PATH_ENV};
pub use provider::ProviderEntry;
pub use settings::{
    config_dir, Config, CriticConfig, LoggingConfig, RefinementSettings, StorageConfig,
    WriterConfig,
};
