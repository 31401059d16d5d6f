use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::AppCore;

pub(crate) const CONFIG_FILE_NAME: &str = "courier_config.json";

const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 1_000;
const DEFAULT_READ_DEBOUNCE_MS: u64 = 500;
const DEFAULT_PAGE_SIZE: u32 = 30;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) api_base_url: Option<String>,
    pub(crate) push_url: Option<String>,
    pub(crate) auth_token: Option<String>,
    pub(crate) disable_network: Option<bool>,
    pub(crate) retry_max_attempts: Option<u32>,
    pub(crate) retry_base_ms: Option<u64>,
    pub(crate) read_debounce_ms: Option<u64>,
    pub(crate) page_size: Option<u32>,
    pub(crate) request_timeout_ms: Option<u64>,
}

impl AppConfig {
    pub(crate) fn retry_max_attempts(&self) -> u32 {
        self.retry_max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS)
    }

    pub(crate) fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms.unwrap_or(DEFAULT_RETRY_BASE_MS))
    }

    pub(crate) fn read_debounce(&self) -> Duration {
        Duration::from_millis(self.read_debounce_ms.unwrap_or(DEFAULT_READ_DEBOUNCE_MS))
    }

    pub(crate) fn page_size(&self) -> u32 {
        self.page_size.filter(|n| *n > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )
    }

    pub(crate) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.disable_network {
            return !disable;
        }
        std::env::var("COURIER_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(crate) fn api_base_url(&self) -> Option<String> {
        std::env::var("COURIER_API_BASE_URL")
            .ok()
            .or_else(|| self.api_base_url.clone())
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
    }

    pub(crate) fn push_url(&self) -> Option<String> {
        self.push_url
            .as_ref()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
    }
}

pub(crate) fn read_app_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice::<AppConfig>(&bytes).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    if !path.exists() {
        return AppConfig::default();
    }
    match read_app_config(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, "config unreadable, using defaults");
            AppConfig::default()
        }
    }
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        self.config.network_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.retry_max_attempts(), 5);
        assert_eq!(config.retry_base(), Duration::from_millis(1_000));
        assert_eq!(config.read_debounce(), Duration::from_millis(500));
        assert_eq!(config.page_size(), 30);
    }

    #[test]
    fn overrides_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"retry_base_ms": 10, "retry_max_attempts": 3, "page_size": 0, "push_url": "  "}"#,
        )
        .unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.retry_base(), Duration::from_millis(10));
        assert_eq!(config.retry_max_attempts(), 3);
        // Zero page size would stall paging.
        assert_eq!(config.page_size(), 30);
        assert_eq!(config.push_url(), None);
    }

    #[test]
    fn malformed_file_is_reported_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            read_app_config(&path),
            Err(ConfigError::Parse { .. })
        ));
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.retry_max_attempts(), 5);
    }
}
