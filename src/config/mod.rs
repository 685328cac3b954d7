//! Bridge configuration: where the analysis service lives and how the
//! editor-side timers are tuned.
//!
//! Project-level config: `.fusion/bridge.yaml` (safe to commit)
//!
//! Resolution: config file → environment (`FUSION_SERVICE_URL`, `PORT`) → defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default project-level config location, relative to the working directory.
pub const PROJECT_CONFIG_PATH: &str = ".fusion/bridge.yaml";

const DEFAULT_SERVICE_URL: &str = "http://localhost:5000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Everything the bridge needs to reach and pace the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the analysis service.
    pub service_url: String,
    pub request_timeout_ms: u64,
    /// Period of the diagnostics poll.
    pub diagnostics_interval_ms: u64,
    /// Quiet period before an edited document is pushed to the service.
    pub change_debounce_ms: u64,
    /// Freshness window for hover results at one position.
    pub hover_cache_ms: u64,
    /// Freshness window for signature help within one call.
    pub signature_cache_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python_path: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.into(),
            request_timeout_ms: 10_000,
            diagnostics_interval_ms: 1_500,
            change_debounce_ms: 300,
            hover_cache_ms: 250,
            signature_cache_ms: 1_000,
            project_root: None,
            python_path: None,
        }
    }
}

impl BridgeConfig {
    /// Load the project config (if any) and apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from(Path::new(PROJECT_CONFIG_PATH)).unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Write the config as YAML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `FUSION_SERVICE_URL` wins over `PORT`; `PORT` targets localhost.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("FUSION_SERVICE_URL").filter(|u| !u.trim().is_empty()) {
            self.service_url = url;
        } else if let Some(port) = var("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            self.service_url = format!("http://localhost:{port}");
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn diagnostics_interval(&self) -> Duration {
        Duration::from_millis(self.diagnostics_interval_ms.max(1))
    }

    pub fn change_debounce(&self) -> Duration {
        Duration::from_millis(self.change_debounce_ms)
    }

    pub fn hover_cache_window(&self) -> Duration {
        Duration::from_millis(self.hover_cache_ms)
    }

    pub fn signature_cache_window(&self) -> Duration {
        Duration::from_millis(self.signature_cache_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.service_url, "http://localhost:5000");
        assert_eq!(config.diagnostics_interval(), Duration::from_millis(1500));
        assert_eq!(config.hover_cache_window(), Duration::from_millis(250));
        assert_eq!(config.signature_cache_window(), Duration::from_secs(1));
    }

    #[test]
    fn load_from_yaml_string() {
        let yaml = r#"
service_url: http://analysis:8080
diagnostics_interval_ms: 500
python_path: /usr/bin/python3
"#;
        let config = BridgeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.service_url, "http://analysis:8080");
        assert_eq!(config.diagnostics_interval_ms, 500);
        assert_eq!(config.python_path.as_deref(), Some("/usr/bin/python3"));
        // Unspecified fields keep their defaults
        assert_eq!(config.change_debounce_ms, 300);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(BridgeConfig::from_yaml("  \n").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn invalid_yaml_is_error() {
        assert!(BridgeConfig::from_yaml("service_url: [unclosed").is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load_from(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".fusion").join("bridge.yaml");
        let config = BridgeConfig {
            service_url: "http://127.0.0.1:7000".into(),
            project_root: Some("/work".into()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = BridgeConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn env_url_overrides_port() {
        let mut config = BridgeConfig::default();
        config.apply_env(|key| match key {
            "FUSION_SERVICE_URL" => Some("http://remote:9000".into()),
            "PORT" => Some("6000".into()),
            _ => None,
        });
        assert_eq!(config.service_url, "http://remote:9000");
    }

    #[test]
    fn env_port_targets_localhost() {
        let mut config = BridgeConfig::default();
        config.apply_env(|key| (key == "PORT").then(|| "6001".to_string()));
        assert_eq!(config.service_url, "http://localhost:6001");

        let mut config = BridgeConfig::default();
        config.apply_env(|key| (key == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.service_url, "http://localhost:5000");
    }
}
