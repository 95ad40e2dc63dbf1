//! Logging setup for the isle CLI.
//!
//! Level selection, first match wins:
//! 1. `--verbose`: debug for isle crates
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`
//! 4. info for isle crates

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "isle_bundler=debug,isle_config=debug,isle_cli=debug";
const QUIET_FILTER: &str = "error";
const DEFAULT_FILTER: &str = "isle_bundler=info,isle_config=info,isle_cli=info";

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter(verbose, quiet))
        .with(fmt_layer)
        .try_init();
}

fn filter(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn flags_pick_the_filter() {
        assert_eq!(filter(true, false).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(filter(false, true).max_level_hint(), Some(LevelFilter::ERROR));
    }
}
