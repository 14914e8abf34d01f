use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EthProxyError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const ENV_PREFIX: &str = "ETH_PROXY";

/// Log verbosity, lowest to highest.
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

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = EthProxyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(EthProxyError::Config(format!("unknown log level '{other}'"))),
        }
    }
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = EthProxyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(EthProxyError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

/// Service configuration. Loaded once at startup, immutable thereafter.
///
/// `urls` is the only field without a default: a comma-separated list of
/// upstream execution node endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    #[serde(rename = "loglevel")]
    pub log_level: Option<LogLevel>,
    #[serde(rename = "logformat")]
    pub log_format: Option<LogFormat>,
    pub urls: String,
}

impl Config {
    /// Reads a YAML config file, then lets `ETH_PROXY_*` environment
    /// variables supersede whatever the file said. A missing file is fine:
    /// the environment alone can carry the whole configuration.
    pub fn load(path: &Path) -> Result<Config> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(raw) => serde_yaml::from_str(&raw)
                .map_err(|e| EthProxyError::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(EthProxyError::Config(format!("{}: {e}", path.display())));
            }
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Environment variables win over file values.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var(format!("{ENV_PREFIX}_PORT")) {
            self.port = port
                .parse()
                .map_err(|_| EthProxyError::Config(format!("invalid port '{port}'")))?;
        }
        if let Ok(level) = std::env::var(format!("{ENV_PREFIX}_LOGLEVEL")) {
            self.log_level = Some(level.parse()?);
        }
        if let Ok(format) = std::env::var(format!("{ENV_PREFIX}_LOGFORMAT")) {
            self.log_format = Some(format.parse()?);
        }
        if let Ok(urls) = std::env::var(format!("{ENV_PREFIX}_URLS")) {
            self.urls = urls;
        }
        Ok(())
    }

    /// Supports a lazy user by replacing empty fields with defaults.
    pub fn sanitize(&mut self) {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.log_level.is_none() {
            self.log_level = Some(LogLevel::default());
        }
        if self.log_format.is_none() {
            self.log_format = Some(LogFormat::default());
        }
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level.unwrap_or_default()
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sanitize_fills_defaults() {
        let mut cfg = Config::default();
        cfg.sanitize();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.log_level(), LogLevel::Info);
        assert_eq!(cfg.log_format(), LogFormat::Plain);
        assert!(cfg.urls.is_empty());
    }

    #[test]
    fn test_yaml_round_trip() {
        let raw = "port: 9090\nloglevel: debug\nlogformat: json\nurls: http://a,http://b\n";
        let cfg: Config = serde_yaml::from_str(raw).unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.log_level(), LogLevel::Debug);
        assert_eq!(cfg.log_format(), LogFormat::Json);
        assert_eq!(cfg.urls, "http://a,http://b");
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let mut cfg = Config::load(Path::new("/definitely/not/here.yml")).unwrap();
        cfg.sanitize();
        assert_eq!(cfg.port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_rejects_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "port: [not a number").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, EthProxyError::Config(_)));
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    }
}
