// postsmith - LinkedIn ghostwriting through a writer/critic refinement loop
// Main entry point

use anyhow::Result;
use clap::Parser;

use postsmith::cli::{run, Cli};
use postsmith::config::{config_path, load_config_file};
use postsmith::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        load_config_file(&config_path())
            .ok()
            .flatten()
            .map(|config| config.logging.level)
            .unwrap_or_else(|| "info".to_string())
    };
    init_tracing(&level);

    run(cli).await
}
