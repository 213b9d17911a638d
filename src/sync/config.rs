//! Configuration for ledger sync
//!
//! Loaded from TOML; every field has a default so a file only needs the
//! settings it changes. Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error loading configuration
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, String),
    /// Settings that parse but cannot work together
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Failed to read {}: {}", path.display(), e),
            ConfigError::Parse(path, msg) => {
                write!(f, "Failed to parse {}: {}", path.display(), msg)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Row used when no checkpoint has been persisted yet
    pub starting_row: u64,
    /// Where the checkpoint file lives
    pub checkpoint_path: PathBuf,
    pub ledger: LedgerConfig,
    pub reconcile: ReconcileConfig,
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            starting_row: 17400,
            checkpoint_path: PathBuf::from("lastrow.txt"),
            ledger: LedgerConfig::default(),
            reconcile: ReconcileConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Create config for testing: small starting row, no waiting
    pub fn test() -> Self {
        SyncConfig {
            starting_row: 2,
            checkpoint_path: PathBuf::from("test-checkpoint.txt"),
            ledger: LedgerConfig {
                backend: LedgerBackend::Memory,
                ..LedgerConfig::default()
            },
            reconcile: ReconcileConfig::test(),
            retry: RetryConfig::test(),
        }
    }

    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(origin.to_path_buf(), e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&text, path)
    }

    /// Reject settings the driver cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_row == 0 {
            return Err(ConfigError::Invalid("starting_row must be at least 1".into()));
        }
        if self.reconcile.steady_search_radius == 0 || self.reconcile.initial_search_radius == 0 {
            return Err(ConfigError::Invalid("search radius must be positive".into()));
        }
        if self.retry.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "max_consecutive_failures must be positive".into(),
            ));
        }
        match self.ledger.backend {
            LedgerBackend::Sheets if self.ledger.spreadsheet_id.is_none() => Err(
                ConfigError::Invalid("sheets backend needs a spreadsheet id".into()),
            ),
            LedgerBackend::Tsv if self.ledger.ledger_file.is_none() => Err(
                ConfigError::Invalid("tsv backend needs a ledger file".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Ledger backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Google Sheets (feature `sheets`)
    Sheets,
    /// Local tab separated file
    Tsv,
    /// In-memory (tests)
    Memory,
}

/// Where the ledger lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub spreadsheet_id: Option<String>,
    /// Worksheet (tab) name
    pub worksheet: String,
    /// Credentials JSON holding an access token
    pub credentials_file: PathBuf,
    /// Backing file for the tsv backend
    pub ledger_file: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            backend: LedgerBackend::Sheets,
            spreadsheet_id: None,
            worksheet: "Support".to_string(),
            credentials_file: PathBuf::from("credentials.json"),
            ledger_file: None,
        }
    }
}

/// Window search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Radius for the first pass after startup or a failure
    pub initial_search_radius: u64,
    /// Radius once the insertion point is known
    pub steady_search_radius: u64,
    /// Rows kept above the checkpoint when a window is extended
    pub extension_margin: u64,
    /// Amounts below this are flagged in the logs
    pub low_value_threshold: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            initial_search_radius: 100,
            steady_search_radius: 20,
            extension_margin: 5,
            low_value_threshold: 24.99,
        }
    }
}

impl ReconcileConfig {
    pub fn test() -> Self {
        ReconcileConfig {
            initial_search_radius: 10,
            steady_search_radius: 4,
            ..Self::default()
        }
    }
}

/// Polling and backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// How long the idle loop waits for a line
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// Sleep after a failed pass
    #[serde(with = "duration_millis")]
    pub backoff_delay: Duration,
    /// Consecutive failed passes before giving up
    pub max_consecutive_failures: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            poll_interval: Duration::from_secs(1),
            backoff_delay: Duration::from_secs(30),
            max_consecutive_failures: 5,
        }
    }
}

impl RetryConfig {
    pub fn test() -> Self {
        RetryConfig {
            poll_interval: Duration::from_millis(10),
            backoff_delay: Duration::from_millis(50),
            max_consecutive_failures: 5,
        }
    }
}

/// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.starting_row, 17400);
        assert_eq!(config.ledger.worksheet, "Support");
        assert_eq!(config.reconcile.initial_search_radius, 100);
        assert_eq!(config.reconcile.steady_search_radius, 20);
        assert_eq!(config.retry.backoff_delay, Duration::from_secs(30));
        assert_eq!(config.retry.max_consecutive_failures, 5);
    }

    #[test]
    fn test_partial_toml() {
        let text = r#"
            starting_row = 500

            [ledger]
            backend = "tsv"
            ledger_file = "ledger.tsv"

            [retry]
            backoff_delay = 2000
        "#;
        let config = SyncConfig::from_toml_str(text, Path::new("test.toml")).unwrap();
        assert_eq!(config.starting_row, 500);
        assert_eq!(config.ledger.backend, LedgerBackend::Tsv);
        assert_eq!(config.retry.backoff_delay, Duration::from_secs(2));
        assert_eq!(config.retry.poll_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml() {
        let err = SyncConfig::from_toml_str("starting_row = \"x\"", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
    }

    #[test]
    fn test_validate() {
        assert!(SyncConfig::test().validate().is_ok());

        let sheets = SyncConfig::default();
        assert!(matches!(sheets.validate(), Err(ConfigError::Invalid(_))));

        let mut zero = SyncConfig::test();
        zero.starting_row = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_retry_serialization() {
        let config = RetryConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RetryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.backoff_delay, parsed.backoff_delay);
    }
}
