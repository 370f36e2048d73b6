//! Application configuration loading and parsing

use anyhow::{Context, Result};
use health_monitor::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path to the JSON health document, relative to the config file
    pub health_config: PathBuf,
    pub app: AppInfo,
    pub mqtt: ConnectionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            health_config: PathBuf::from("config/health.json"),
            app: AppInfo::default(),
            mqtt: ConnectionConfig::default(),
        }
    }
}

/// Application identity shown in reports
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub organization: String,
    pub theme: Theme,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "Health Monitor".to_string(),
            version: "1.0.0".to_string(),
            organization: "Your Company".to_string(),
            theme: Theme::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

impl AppConfig {
    /// Health document path, resolved against the directory of `config_path`
    pub fn health_path(&self, config_path: Option<&Path>) -> PathBuf {
        match config_path.and_then(Path::parent) {
            Some(dir) if self.health_config.is_relative() => dir.join(&self.health_config),
            _ => self.health_config.clone(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.mqtt.subscriptions.is_empty() {
        log::warn!("No MQTT subscriptions configured; no telemetry will arrive");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            health_config = "health.json"

            [app]
            name = "Cabin Health"
            theme = "light"

            [mqtt]
            host = "10.0.0.7"
            port = 8883
            username = "ops"
            password = "secret"
            subscriptions = ["ppss/health", "ppss/seats"]
            retries_max = 3
            retry_interval_ms = 500
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.app.name, "Cabin Health");
        assert_eq!(config.app.theme, Theme::Light);
        assert_eq!(config.app.organization, "Your Company");
        assert_eq!(config.mqtt.endpoint(), "10.0.0.7:8883");
        assert_eq!(config.mqtt.subscriptions.len(), 2);
        assert_eq!(config.mqtt.retries_max, 3);
        assert_eq!(config.mqtt.retry_interval(), Duration::from_millis(500));
        assert_eq!(config.mqtt.client_id, "health-monitor");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.health_config, PathBuf::from("config/health.json"));
        assert_eq!(config.mqtt.endpoint(), "localhost:1883");
        assert_eq!(config.mqtt.subscriptions, vec!["ppss/health"]);
        assert_eq!(config.app.theme, Theme::Dark);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt]\nport = 1884").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.mqtt.port, 1884);
    }

    #[test]
    fn test_load_config_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mqtt\nport = ").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));

        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_health_path_is_relative_to_config() {
        let config = AppConfig::default();
        assert_eq!(
            config.health_path(Some(Path::new("/etc/monitor/config.toml"))),
            PathBuf::from("/etc/monitor/config/health.json")
        );
        assert_eq!(config.health_path(None), PathBuf::from("config/health.json"));

        let absolute = AppConfig {
            health_config: PathBuf::from("/srv/health.json"),
            ..AppConfig::default()
        };
        assert_eq!(
            absolute.health_path(Some(Path::new("/etc/monitor/config.toml"))),
            PathBuf::from("/srv/health.json")
        );
    }
}
