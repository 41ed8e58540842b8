use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};
use crate::error::{MonitorError, MonitorResult};

pub const DEFAULT_TARGET_URL: &str = "https://www.coinglass.com/zh/exchanges/Binance";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub oi_change_threshold: f64,
    pub min_oi_usdt: f64,
    /// Informational only, the schedule is owned by whatever invokes the run.
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub target_url: String,
    pub capture_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub callback_name: String,
    pub min_body_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor_settings: MonitorSettings,
    pub feishu_webhook: Option<String>,
    pub capture: CaptureConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            oi_change_threshold: 0.05,
            min_oi_usdt: 0.0,
            interval_seconds: 300,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            capture_timeout_secs: 50,
            navigation_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
            callback_name: "onCapturedData".to_string(),
            min_body_len: 500,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { path: "history_oi.json".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl CaptureConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from a JSON file. A missing file is not an error
    /// and yields the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> MonitorResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Configuration(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| MonitorError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    /// Overlay environment variables on top of the file values
    pub fn apply_env(&mut self) {
        if self.webhook().is_none() {
            if let Ok(webhook) = env::var("FEISHU_WEBHOOK") {
                self.feishu_webhook = Some(webhook);
            }
        }

        if let Ok(url) = env::var("OI_TARGET_URL") {
            self.capture.target_url = url;
        }

        if let Ok(path) = env::var("HISTORY_FILE") {
            self.history.path = path;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> MonitorResult<()> {
        let settings = &self.monitor_settings;
        if !settings.oi_change_threshold.is_finite() || settings.oi_change_threshold <= 0.0 {
            return Err(MonitorError::Configuration("OI change threshold must be a positive number".to_string()));
        }

        if !settings.min_oi_usdt.is_finite() || settings.min_oi_usdt < 0.0 {
            return Err(MonitorError::Configuration("Minimum OI notional cannot be negative".to_string()));
        }

        let capture = &self.capture;
        if capture.target_url.trim().is_empty() {
            return Err(MonitorError::Configuration("Target URL cannot be empty".to_string()));
        }

        url::Url::parse(&capture.target_url)
            .map_err(|e| MonitorError::Configuration(format!("Invalid target URL {}: {}", capture.target_url, e)))?;

        if capture.capture_timeout_secs == 0 || capture.navigation_timeout_secs == 0 {
            return Err(MonitorError::Configuration("Capture and navigation timeouts must be greater than 0".to_string()));
        }

        if capture.callback_name.trim().is_empty() {
            return Err(MonitorError::Configuration("Capture callback name cannot be empty".to_string()));
        }

        if self.history.path.trim().is_empty() {
            return Err(MonitorError::Configuration("History path cannot be empty".to_string()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(MonitorError::Configuration(format!("Invalid log level: {}", self.logging.level)));
        }

        Ok(())
    }

    /// Effective outbound endpoint, if any
    pub fn webhook(&self) -> Option<&str> {
        self.feishu_webhook
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"monitor_settings": {"oi_change_threshold": 0.08}, "feishu_webhook": "https://hook"}"#,
        ).unwrap();

        assert_eq!(config.monitor_settings.oi_change_threshold, 0.08);
        assert_eq!(config.monitor_settings.min_oi_usdt, 0.0);
        assert_eq!(config.monitor_settings.interval_seconds, 300);
        assert_eq!(config.capture.capture_timeout_secs, 50);
        assert_eq!(config.history.path, "history_oi.json");
        assert_eq!(config.webhook(), Some("https://hook"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_file(dir.path().join("config.json")).unwrap();
        assert_eq!(config.monitor_settings.oi_change_threshold, 0.05);
        assert!(config.webhook().is_none());
    }

    #[test]
    fn corrupt_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(MonitorError::Configuration(_))));
    }

    #[test]
    fn blank_webhook_counts_as_unset() {
        let config = AppConfig {
            feishu_webhook: Some("   ".into()),
            ..AppConfig::default()
        };
        assert!(config.webhook().is_none());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.monitor_settings.oi_change_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.monitor_settings.min_oi_usdt = -1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.target_url = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.capture_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());
    }
}
