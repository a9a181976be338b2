//! Configuration loading and data directory resolution
//!
//! Resolution follows the priority order used throughout Coda:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// AI rater endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RaterConfig {
    /// Rating service base URL
    pub endpoint: String,
    /// API key, if the service requires one
    pub api_key: Option<String>,
    /// Per-call timeout; non-success after this is a per-subject failure
    pub timeout_seconds: u64,
}

impl Default for RaterConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5861/rate".to_string(),
            api_key: None,
            timeout_seconds: 60,
        }
    }
}

/// Scoring service endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Scoring service base URL
    pub endpoint: String,
    /// Per-call timeout
    pub timeout_seconds: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5862/scores".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// Batch rating engine tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrent rating calls per batch
    pub batch_size: usize,
    /// Delay between batches in milliseconds
    pub batch_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay_ms: 250,
        }
    }
}

/// Top-level Coda configuration (`~/.config/coda/coda.toml`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodaConfig {
    /// SQLite database path; None falls back to the platform data directory
    pub database_path: Option<PathBuf>,
    /// HTTP bind address for the judgment service
    pub bind_address: String,
    /// Rater id written on human judgments (one operator at a time)
    pub human_rater_id: String,
    /// Rater id written on AI judgments
    pub ai_rater_id: String,
    /// Trigger one AI call when a subject without an AI judgment is opened
    pub auto_rate_on_view: bool,
    /// Debounce interval for progress count recomputation, in milliseconds
    pub progress_debounce_ms: u64,
    /// AI rater endpoint
    pub rater: RaterConfig,
    /// Scoring service endpoint
    pub scoring: ScoringConfig,
    /// Batch engine tuning
    pub batch: BatchConfig,
}

impl Default for CodaConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            bind_address: "127.0.0.1:5810".to_string(),
            human_rater_id: "local".to_string(),
            ai_rater_id: "coda-ai".to_string(),
            auto_rate_on_view: true,
            progress_debounce_ms: 250,
            rater: RaterConfig::default(),
            scoring: ScoringConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl CodaConfig {
    /// Load configuration with CLI > ENV > TOML > default priority
    ///
    /// `cli_path` is an explicit config file path from the command line.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate_config_file(cli_path) {
            Some(path) => {
                let content = std::fs::read_to_string(&path)?;
                let config: CodaConfig = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
                info!("Configuration loaded from {}", path.display());
                config
            }
            None => {
                info!("No config file found, using defaults");
                CodaConfig::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolved database path: configured path, or platform data dir default
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("coda.db"))
    }

    fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_path {
            if !path.exists() {
                warn!("Config file {} does not exist", path.display());
            }
            return Some(path.to_path_buf());
        }
        let default = dirs::config_dir().map(|d| d.join("coda").join("coda.toml"))?;
        default.exists().then_some(default)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CODA_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Ok(addr) = std::env::var("CODA_BIND") {
            self.bind_address = addr;
        }
        if let Ok(endpoint) = std::env::var("CODA_RATER_ENDPOINT") {
            self.rater.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("CODA_RATER_API_KEY") {
            if !key.trim().is_empty() {
                if self.rater.api_key.is_some() {
                    warn!("Rater API key set in both config file and environment, using environment");
                }
                self.rater.api_key = Some(key);
            }
        }
        if let Ok(endpoint) = std::env::var("CODA_SCORING_ENDPOINT") {
            self.scoring.endpoint = endpoint;
        }
    }
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("coda"))
        .unwrap_or_else(|| PathBuf::from("./coda_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodaConfig::default();
        assert_eq!(config.batch.batch_size, 10);
        assert_eq!(config.human_rater_id, "local");
        assert!(config.auto_rate_on_view);
        assert!(config.database_path().ends_with("coda.db"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            bind_address = "127.0.0.1:9001"
            auto_rate_on_view = false

            [batch]
            batch_size = 3
        "#;
        let config: CodaConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9001");
        assert!(!config.auto_rate_on_view);
        assert_eq!(config.batch.batch_size, 3);
        // Untouched sections keep defaults
        assert_eq!(config.batch.batch_delay_ms, 250);
        assert_eq!(config.rater.timeout_seconds, 60);
    }

    #[test]
    #[serial_test::serial]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coda.toml");
        std::fs::write(&path, "human_rater_id = \"reviewer-1\"\n").unwrap();

        let config = CodaConfig::load(Some(&path)).unwrap();
        assert_eq!(config.human_rater_id, "reviewer-1");
    }

    #[test]
    #[serial_test::serial]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coda.toml");
        std::fs::write(&path, "bind_address = \"127.0.0.1:9001\"\n").unwrap();

        std::env::set_var("CODA_BIND", "127.0.0.1:9002");
        std::env::set_var("CODA_DATABASE", "/tmp/override.db");
        let config = CodaConfig::load(Some(&path)).unwrap();
        std::env::remove_var("CODA_BIND");
        std::env::remove_var("CODA_DATABASE");

        assert_eq!(config.bind_address, "127.0.0.1:9002");
        assert_eq!(
            config.database_path(),
            std::path::PathBuf::from("/tmp/override.db")
        );
    }
}
