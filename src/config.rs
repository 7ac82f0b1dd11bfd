//! Configuration file schema (§6.3). Loading is in scope even though the
//! spec treats config *parsing as a file format* as external — the feed
//! handlers still need a concrete schema to read.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5010
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerplantConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for TickerplantConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub symbols: Vec<String>,
    #[serde(default)]
    pub tickerplant: TickerplantConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Fatal(format!("cannot read config {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::Fatal(format!("invalid config {}: {e}", path.display())))?;
        if config.symbols.is_empty() {
            return Err(Error::Fatal("config must list at least one symbol".into()));
        }
        Ok(config)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        match self.logging.level.to_ascii_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_defaults_when_sections_omitted() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"symbols": ["btcusdt", "ethusdt"]}}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.symbols, vec!["btcusdt", "ethusdt"]);
        assert_eq!(config.tickerplant.host, "localhost");
        assert_eq!(config.tickerplant.port, 5010);
        assert_eq!(config.reconnect.initial_backoff_ms, 1000);
        assert_eq!(config.reconnect.max_backoff_ms, 8000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_empty_symbol_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"symbols": []}}"#).unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn rejects_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/path.json")).is_err());
    }
}
