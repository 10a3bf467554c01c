// Tracing setup for the postsmith binary
//
// Logs go to stderr so post text printed on stdout can be piped cleanly.
// RUST_LOG overrides the configured level.

use tracing_subscriber::EnvFilter;

const FALLBACK_FILTER: &str = "info";

/// Filter from RUST_LOG, else `level`, else "info"
fn filter_for(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid log level '{level}' ({e}), using '{FALLBACK_FILTER}'");
        EnvFilter::new(FALLBACK_FILTER)
    })
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_tracing(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert_eq!(filter_for("postsmith=debug").to_string(), "postsmith=debug");
        assert_eq!(filter_for("postsmith=loud").to_string(), "info");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing("warn");
        init_tracing("debug");
    }
}
