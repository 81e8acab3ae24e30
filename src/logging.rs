//! Subscriber setup for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! binary's job. Logs go to stderr so stdout stays clean for summaries.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Directive string overriding both `RUST_LOG` and `level`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::default(),
            filter: None,
        }
    }
}

impl LogConfig {
    /// Level from `-v`/`-q` counts, starting at `warn`.
    pub fn from_verbosity(verbose: u8, quiet: bool, format: LogFormat) -> Self {
        let level = if quiet {
            Level::ERROR
        } else {
            match verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };
        Self {
            level,
            format,
            filter: None,
        }
    }

    /// Replace the level with explicit directives such as `cell_thermal=debug`.
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(custom) => {
                EnvFilter::try_new(custom).unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
            }
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.to_string())),
        }
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = config.env_filter();
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let result = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(layer.json()),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(layer.pretty()),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(layer.compact()),
        ),
    };

    // Already installed (tests, embedding).
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(LogConfig::from_verbosity(0, false, LogFormat::Compact).level, Level::WARN);
        assert_eq!(LogConfig::from_verbosity(1, false, LogFormat::Compact).level, Level::INFO);
        assert_eq!(LogConfig::from_verbosity(5, false, LogFormat::Compact).level, Level::TRACE);
        assert_eq!(LogConfig::from_verbosity(3, true, LogFormat::Compact).level, Level::ERROR);
    }

    #[test]
    fn explicit_filter_takes_precedence_over_level() {
        let cfg = LogConfig::from_verbosity(0, false, LogFormat::Compact)
            .with_filter(Some("cell_thermal=debug".into()));
        assert_eq!(cfg.filter.as_deref(), Some("cell_thermal=debug"));
        assert!(cfg.env_filter().to_string().contains("cell_thermal=debug"));

        let plain = LogConfig::from_verbosity(1, false, LogFormat::Compact).with_filter(None);
        assert_eq!(plain.filter, None);
    }

    #[test]
    fn init_twice_is_harmless() {
        let cfg = LogConfig::default();
        init_logging(&cfg);
        init_logging(&cfg);
    }
}
