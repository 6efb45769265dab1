//! Feed Configuration Settings
//!
//! Configuration for the feed binary, loaded from environment variables and
//! an optional JSON instrument file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::infrastructure::poloniex::{DEFAULT_FEED_URL, DEFAULT_PENDING_LIMIT, SessionConfig};

/// Instruments subscribed when none are configured.
pub const DEFAULT_INSTRUMENTS: [&str; 3] = ["BTC_USDT", "TRX_USDT", "ETH_USDT"];

/// Default session deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3);

/// Instrument file layout.
///
/// # File Format (JSON)
/// ```json
/// {"poloniex": ["BTC_USDT", "ETH_USDT"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstrumentsFile {
    /// Symbols to subscribe on Poloniex, `BASE_QUOTE`.
    #[serde(default)]
    pub poloniex: Vec<String>,
}

/// Complete feed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Push API endpoint.
    pub url: String,
    /// Symbols to subscribe, `BASE_QUOTE`.
    pub instruments: Vec<String>,
    /// Session deadline, counted from connect (`None` = until Ctrl+C).
    pub deadline: Option<Duration>,
    /// Max records held per unlearned channel.
    pub pending_limit: usize,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            instruments: DEFAULT_INSTRUMENTS.iter().map(ToString::to_string).collect(),
            deadline: Some(DEFAULT_DEADLINE),
            pending_limit: DEFAULT_PENDING_LIMIT,
            metrics_port: 0,
        }
    }
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but empty, or if the instrument
    /// file cannot be read or parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// `FEED_INSTRUMENTS` takes precedence over `FEED_CONFIG_PATH`.
    ///
    /// # Errors
    ///
    /// See [`FeedConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let url = match lookup("POLONIEX_WS_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("POLONIEX_WS_URL".to_string()));
            }
            Some(url) => url.trim().to_string(),
            None => defaults.url,
        };

        let instruments = if let Some(list) = lookup("FEED_INSTRUMENTS") {
            let instruments = split_list(&list);
            if instruments.is_empty() {
                return Err(ConfigError::EmptyValue("FEED_INSTRUMENTS".to_string()));
            }
            instruments
        } else if let Some(path) = lookup("FEED_CONFIG_PATH") {
            load_instruments_file(Path::new(path.trim()))?
        } else {
            defaults.instruments
        };

        let deadline_secs = parse_var(&lookup, "FEED_SESSION_DEADLINE_SECS", DEFAULT_DEADLINE.as_secs());
        let deadline = (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs));

        Ok(Self {
            url,
            instruments,
            deadline,
            pending_limit: parse_var(&lookup, "FEED_PENDING_LIMIT", defaults.pending_limit),
            metrics_port: parse_var(&lookup, "FEED_METRICS_PORT", defaults.metrics_port),
        })
    }

    /// Session settings derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let config = SessionConfig::new(self.url.clone()).with_pending_limit(self.pending_limit);
        match self.deadline {
            Some(deadline) => config.with_deadline(deadline),
            None => config,
        }
    }
}

/// Read the symbol list from an instrument file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid JSON, or if
/// it lists no Poloniex instruments.
pub fn load_instruments_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let file: InstrumentsFile =
        serde_json::from_str(&text).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;

    if file.poloniex.is_empty() {
        return Err(ConfigError::EmptyValue(format!("{}: poloniex", path.display())));
    }

    Ok(file.poloniex)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Setting is present but empty.
    #[error("configuration value {0} cannot be empty")]
    EmptyValue(String),

    /// Instrument file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadFile {
        /// File path.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Instrument file is not valid JSON.
    #[error("failed to parse {path}: {source}")]
    ParseFile {
        /// File path.
        path: PathBuf,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|symbol| !symbol.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<FeedConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        FeedConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.url, "wss://api2.poloniex.com");
        assert_eq!(config.instruments, vec!["BTC_USDT", "TRX_USDT", "ETH_USDT"]);
        assert_eq!(config.deadline, Some(Duration::from_secs(3)));
        assert_eq!(config.pending_limit, 1024);
        assert_eq!(config.metrics_port, 0);
    }

    #[test]
    fn instrument_list_from_env() {
        let config = config(&[("FEED_INSTRUMENTS", " BTC_USDT, ,DOGE_BTC ")]).unwrap();
        assert_eq!(config.instruments, vec!["BTC_USDT", "DOGE_BTC"]);
    }

    #[test]
    fn empty_instrument_list_is_rejected() {
        let err = config(&[("FEED_INSTRUMENTS", " , ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "FEED_INSTRUMENTS"));
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(matches!(
            config(&[("POLONIEX_WS_URL", "")]),
            Err(ConfigError::EmptyValue(_))
        ));
    }

    #[test]
    fn zero_deadline_runs_until_cancelled() {
        let config = config(&[("FEED_SESSION_DEADLINE_SECS", "0")]).unwrap();
        assert_eq!(config.deadline, None);
        assert_eq!(config.session_config().deadline, None);
    }

    #[test]
    fn numeric_overrides_and_fallbacks() {
        let config = config(&[
            ("FEED_SESSION_DEADLINE_SECS", "10"),
            ("FEED_PENDING_LIMIT", "not a number"),
            ("FEED_METRICS_PORT", "9091"),
        ])
        .unwrap();

        assert_eq!(config.deadline, Some(Duration::from_secs(10)));
        assert_eq!(config.pending_limit, 1024);
        assert_eq!(config.metrics_port, 9091);

        let session = config.session_config();
        assert_eq!(session.deadline, Some(Duration::from_secs(10)));
        assert_eq!(session.pending_limit, 1024);
    }

    #[test]
    fn instruments_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"poloniex": ["ETH_USDT", "TRX_USDT"]}}"#).unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = config(&[("FEED_CONFIG_PATH", &path)]).unwrap();

        assert_eq!(config.instruments, vec!["ETH_USDT", "TRX_USDT"]);
    }

    #[test]
    fn env_list_takes_precedence_over_file() {
        let config = config(&[
            ("FEED_INSTRUMENTS", "BTC_USDT"),
            ("FEED_CONFIG_PATH", "/does/not/exist.json"),
        ])
        .unwrap();

        assert_eq!(config.instruments, vec!["BTC_USDT"]);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_instruments_file(Path::new("/does/not/exist.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn invalid_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "poloniex: [BTC_USDT]").unwrap();

        let err = load_instruments_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFile { .. }));
    }

    #[test]
    fn file_without_poloniex_section_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"binance": ["BTCUSDT"]}}"#).unwrap();

        let err = load_instruments_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }
}
