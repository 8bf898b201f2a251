//! Tracing setup for the CLI.
//!
//! Logs go to stderr so stdout stays clean for `--json` and `--dry-run`.
//! `RUST_LOG` wins over the `-v` count when set.

use tracing_subscriber::EnvFilter;

pub fn level_for(verbose: u8, silent: bool) -> tracing::Level {
    if silent {
        return tracing::Level::ERROR;
    }
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: u8, silent: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbose, silent).to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0, false), tracing::Level::WARN);
        assert_eq!(level_for(1, false), tracing::Level::INFO);
        assert_eq!(level_for(2, false), tracing::Level::DEBUG);
        assert_eq!(level_for(7, false), tracing::Level::TRACE);
        assert_eq!(level_for(3, true), tracing::Level::ERROR);
    }
}
