//! Blastline configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastlineConfig {
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

fn default_country_code() -> String {
    "91".into()
}

impl Default for BlastlineConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
            storage: StorageConfig::default(),
            transport: TransportConfig::default(),
            media: MediaConfig::default(),
            moderation: ModerationConfig::default(),
            dispatch: DispatchConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl BlastlineConfig {
    /// Load config from the default path (~/.blastline/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::BlastlineError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::BlastlineError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BlastlineError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Blastline home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".blastline")
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.blastline/blastline.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

/// Transport gateway configuration (session-based chat API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_transport_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_transport_url() -> String {
    "http://127.0.0.1:3333".into()
}
fn default_transport_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_transport_url(),
            api_key: String::new(),
            timeout_secs: default_transport_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Media upload configuration: where attachments become durable URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default = "default_media_timeout")]
    pub timeout_secs: u64,
}

fn default_upload_url() -> String {
    "http://127.0.0.1:3333/uploads".into()
}
fn default_media_timeout() -> u64 {
    120
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            timeout_secs: default_media_timeout(),
        }
    }
}

/// Moderation gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Coarse classifier endpoint (OpenAI-compatible moderations API).
    #[serde(default = "default_moderation_url")]
    pub endpoint: String,
    #[serde(default = "default_moderation_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
    /// Enable the fine-grained illegal-trade classifier pass.
    #[serde(default = "bool_true")]
    pub trade_classifier: bool,
    /// Fine classifier endpoint; the pass is skipped while this is empty.
    #[serde(default)]
    pub trade_endpoint: String,
    /// Strict gate: review counts as denied (the conservative default).
    #[serde(default = "bool_true")]
    pub ai_only_gate: bool,
    /// Downgrade violence blocks to review when the text carries an
    /// explicit non-violence disclaimer. Off by default.
    #[serde(default)]
    pub disclaimer_downgrade: bool,
    #[serde(default = "default_hard_block_confidence")]
    pub hard_block_confidence: f32,
    #[serde(default = "default_review_confidence")]
    pub review_confidence: f32,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_moderation_url() -> String {
    "https://api.openai.com/v1/moderations".into()
}
fn default_moderation_model() -> String {
    "omni-moderation-latest".into()
}
fn default_classifier_timeout() -> u64 {
    15
}
fn bool_true() -> bool {
    true
}
fn default_hard_block_confidence() -> f32 {
    0.70
}
fn default_review_confidence() -> f32 {
    0.60
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_cache_capacity() -> usize {
    512
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_moderation_url(),
            model: default_moderation_model(),
            api_key: String::new(),
            timeout_secs: default_classifier_timeout(),
            trade_classifier: true,
            trade_endpoint: String::new(),
            ai_only_gate: true,
            disclaimer_downgrade: false,
            hard_block_confidence: default_hard_block_confidence(),
            review_confidence: default_review_confidence(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Dispatch worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Concurrent campaign workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Idle sleep between queue polls.
    #[serde(default = "default_queue_poll")]
    pub queue_poll_secs: u64,
    /// Pause/cancel probe tick inside sleeps. Must stay <= 15s so a pause
    /// issued during a long cooldown is observed promptly.
    #[serde(default = "default_control_tick")]
    pub control_tick_secs: u64,
}

fn default_workers() -> usize {
    4
}
fn default_queue_poll() -> u64 {
    5
}
fn default_control_tick() -> u64 {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_poll_secs: default_queue_poll(),
            control_tick_secs: default_control_tick(),
        }
    }
}

/// Watchdog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_watchdog_interval")]
    pub interval_secs: u64,
    /// A running campaign with no update for this long is considered stuck.
    #[serde(default = "default_staleness")]
    pub staleness_secs: u64,
}

fn default_watchdog_interval() -> u64 {
    300
}
fn default_staleness() -> u64 {
    900
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watchdog_interval(),
            staleness_secs: default_staleness(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BlastlineConfig::default();
        assert_eq!(config.default_country_code, "91");
        assert_eq!(config.dispatch.workers, 4);
        assert!(config.moderation.ai_only_gate);
        assert!(!config.moderation.disclaimer_downgrade);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            default_country_code = "44"

            [dispatch]
            workers = 2
            control_tick_secs = 5

            [moderation]
            ai_only_gate = false
        "#;

        let config: BlastlineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_country_code, "44");
        assert_eq!(config.dispatch.workers, 2);
        assert_eq!(config.dispatch.control_tick_secs, 5);
        assert!(!config.moderation.ai_only_gate);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let toml_str = "";
        let config: BlastlineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.watchdog.staleness_secs, 900);
        assert_eq!(config.moderation.cache_capacity, 512);
    }

    #[test]
    fn test_home_dir() {
        let home = BlastlineConfig::home_dir();
        assert!(home.to_string_lossy().contains("blastline"));
    }
}
