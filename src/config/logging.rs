//! Logging configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Log severity, the five tracing levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl LoggingConfig {
    /// Default EnvFilter directive for this configuration.
    ///
    /// RUST_LOG still wins when set; this is the fallback the CLI installs.
    pub fn filter_directive(&self) -> String {
        format!("modqueue={}", self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directive_uses_configured_level() {
        let cfg = LoggingConfig {
            format: LogFormat::Text,
            level: LogLevel::Debug,
        };
        assert_eq!(cfg.filter_directive(), "modqueue=debug");
    }

    #[test]
    fn defaults_are_text_at_info() {
        let cfg: LoggingConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.format, LogFormat::Text);
        assert_eq!(cfg.level, LogLevel::Info);
    }
}
