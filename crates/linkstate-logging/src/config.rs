//! Logging configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level directive (e.g. "info", "linkstate_routing=debug")
    pub default_level: String,
    /// Console output
    pub console: ConsoleConfig,
    /// Optional file output
    pub file: Option<FileConfig>,
    /// Fields attached to every JSON line
    pub json: JsonConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig::default(),
            file: None,
            json: JsonConfig::default(),
        }
    }
}

impl LogConfig {
    /// Human-readable output for interactive runs
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleConfig {
                enabled: true,
                pretty: true,
                ansi: true,
            },
            file: None,
            json: JsonConfig::default(),
        }
    }

    /// Quiet output for test runs
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            console: ConsoleConfig {
                enabled: true,
                pretty: true,
                ansi: false,
            },
            file: None,
            json: JsonConfig::default(),
        }
    }

    /// JSON lines to the console and a daily file under `log_dir`
    pub fn simulation(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleConfig {
                enabled: true,
                pretty: false,
                ansi: false,
            },
            file: Some(FileConfig {
                directory: log_dir.into(),
                prefix: "linkstate-sim".to_string(),
                rotation: RotationStrategy::Daily,
            }),
            json: JsonConfig::default(),
        }
    }
}

/// Console output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Enable console output
    pub enabled: bool,
    /// Pretty text instead of JSON lines
    pub pretty: bool,
    /// ANSI colors
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pretty: false,
            ansi: false,
        }
    }
}

/// File output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Directory for log files
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Rotation strategy
    #[serde(default)]
    pub rotation: RotationStrategy,
}

/// Log file rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// One file, `<prefix>.log`
    Never,
}

/// JSON line contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonConfig {
    /// Put event fields at the top level instead of under "fields"
    pub flatten_events: bool,
    /// Include the current span
    pub include_current_span: bool,
    /// Include the full span list
    pub include_span_list: bool,
    /// Include file and line
    pub include_location: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_current_span: true,
            include_span_list: false,
            include_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.default_level, "debug");
        assert!(dev.console.pretty);
        assert!(dev.file.is_none());

        let testing = LogConfig::testing();
        assert_eq!(testing.default_level, "warn");
        assert!(!testing.console.ansi);

        let sim = LogConfig::simulation("/tmp/linkstate-logs");
        let file = sim.file.unwrap();
        assert_eq!(file.prefix, "linkstate-sim");
        assert_eq!(file.rotation, RotationStrategy::Daily);
        assert!(!sim.console.pretty);
    }

    #[test]
    fn test_default_is_json_console() {
        let config = LogConfig::default();
        assert!(config.console.enabled);
        assert!(!config.console.pretty);
        assert!(config.json.flatten_events);
    }
}
