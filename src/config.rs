//! Configuration file parser for ~/.config/gator/config.toml, plus the
//! polling-interval grammar used on the command line.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde and logged as a warning.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Invalid polling interval `{0}`: expected a positive duration such as 30s, 1m or 1h30m")]
    InvalidInterval(String),

    #[error("HOME environment variable not set")]
    NoHome,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `gator.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// User that owns newly added feeds and whose posts `browse` shows.
    pub current_user_name: String,

    /// Client identifier sent with every feed request.
    pub user_agent: String,

    /// Upper bound for a single feed fetch, in seconds.
    pub fetch_timeout_secs: u64,

    /// Largest feed body accepted, in bytes.
    pub max_feed_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            current_user_name: "gator".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "database_path",
        "current_user_name",
        "user_agent",
        "fetch_timeout_secs",
        "max_feed_bytes",
    ];

    /// The config directory (`~/.config/gator/`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(".config").join("gator"))
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::InvalidValue)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), user = %config.current_user_name, "Loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "fetch_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_feed_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_feed_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "user_agent",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Database location, falling back to `<config_dir>/gator.db`.
    ///
    /// `config_dir` is only consulted when no explicit path is configured.
    pub fn database_path<F>(&self, config_dir: F) -> Result<PathBuf, ConfigError>
    where
        F: FnOnce() -> Result<PathBuf, ConfigError>,
    {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("gator.db")),
        }
    }
}

// ============================================================================
// Polling Interval
// ============================================================================

/// Parse a polling interval such as `30s`, `1m`, `1h30m` or `1.5s`.
///
/// The grammar is a sequence of decimal numbers, each with an optional
/// fraction and a mandatory unit (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`).
/// Zero, negative and unit-less values are rejected.
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidInterval(input.to_string());

    let trimmed = input.trim();
    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after) = rest.split_at(number_end);

        let unit_end = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_end);
        rest = after;

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(invalid()),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(invalid)?;

        let mut scale = unit_nanos;
        for digit in fraction.chars() {
            let digit = digit.to_digit(10).ok_or_else(invalid)?;
            scale /= 10;
            if scale == 0 {
                break;
            }
            nanos += u128::from(digit) * scale;
        }

        total = total.checked_add(nanos).ok_or_else(invalid)?;
    }

    let nanos = u64::try_from(total).map_err(|_| invalid())?;
    if nanos == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos))
}

// ============================================================================
// Tests
// ============================================================================
