use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Stderr log rendering.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    /// One JSON object per event, fields flattened to the top level.
    Json,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Flag or env value first, then the config file, then `info`.
    pub fn resolve(explicit: Option<LogLevel>, from_config: Option<LogLevel>) -> LogLevel {
        explicit.or(from_config).unwrap_or_default()
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. Connection threads are named, so the
/// thread name is kept in every line.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::from(level))
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    let installed = match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().flatten_event(true).try_init().is_ok(),
    };
    if installed {
        tracing::debug!(?level, "logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_wins_over_config() {
        assert_eq!(
            LogLevel::resolve(Some(LogLevel::Warn), Some(LogLevel::Trace)),
            LogLevel::Warn
        );
        assert_eq!(
            LogLevel::resolve(None, Some(LogLevel::Debug)),
            LogLevel::Debug
        );
        assert_eq!(LogLevel::resolve(None, None), LogLevel::Info);
    }

    #[test]
    fn config_spelling_is_lowercase() {
        #[derive(Deserialize)]
        struct Section {
            level: LogLevel,
        }
        let section: Section = toml::from_str("level = \"debug\"").unwrap();
        assert_eq!(section.level, LogLevel::Debug);
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::ERROR);
    }
}
