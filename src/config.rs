//! 配置加载
//!
//! 读取优先级：
//! 1. 配置文件 `~/.config/storefront/config.json`
//! 2. 环境变量 `STOREFRONT_API_URL` / `STOREFRONT_TIMEOUT_MS`（覆盖文件中的值）
//! 3. 默认值

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::notification::{Position, Theme};

/// 默认 API 地址
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// 默认请求超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// 实时通道重连配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// 最大重连次数
    pub max_attempts: u32,
    /// 首次重连延迟（毫秒）
    pub base_delay_ms: u64,
    /// 重连延迟上限（毫秒）
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    /// 第 `attempt` 次重连（从 1 开始）前的等待时间：`base * 2^(attempt-1)`，不超过上限
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// 全局配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontConfig {
    /// API 基础地址
    pub api_base_url: String,
    /// 请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 401 后跳转的登录页
    pub login_path: String,
    /// 401 后延迟跳转（毫秒），留时间给用户看到提示
    pub redirect_delay_ms: u64,
    /// 实时通道地址，未配置时不连接
    pub realtime_url: Option<String>,
    pub position: Position,
    pub theme: Theme,
    pub reconnect: ReconnectConfig,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            login_path: "/login".to_string(),
            redirect_delay_ms: 1000,
            realtime_url: None,
            position: Position::default(),
            theme: Theme::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl StorefrontConfig {
    /// 配置文件路径
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("storefront")
            .join("config.json")
    }

    /// 从配置文件和环境变量自动加载
    ///
    /// 配置文件损坏时记录警告并使用默认值，不会失败。
    pub fn auto_load() -> Self {
        let mut config = match Self::load_from(&Self::path()) {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load config file, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// 读取指定配置文件，文件不存在返回 `Ok(None)`
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(Some(config))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("STOREFRONT_API_URL") {
            if !url.is_empty() {
                debug!("Using STOREFRONT_API_URL from environment");
                self.api_base_url = url;
            }
        }
        if let Ok(timeout) = std::env::var("STOREFRONT_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.request_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid STOREFRONT_TIMEOUT_MS"),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = StorefrontConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.login_path, "/login");
        assert!(config.realtime_url.is_none());
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"api_base_url":"https://shop.example.com/api","position":"bottom-left","reconnect":{"max_attempts":3}}"#,
        )
        .unwrap();

        let config = StorefrontConfig::load_from(&path).unwrap().unwrap();
        assert_eq!(config.api_base_url, "https://shop.example.com/api");
        assert_eq!(config.position, Position::BottomLeft);
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert_eq!(config.request_timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_missing_and_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(StorefrontConfig::load_from(&missing).unwrap().is_none());

        let invalid = dir.path().join("invalid.json");
        fs::write(&invalid, "{oops").unwrap();
        assert!(StorefrontConfig::load_from(&invalid).is_err());
    }

    #[test]
    fn test_reconnect_delay_is_capped() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(reconnect.delay_for(1), Duration::from_millis(1000));
        assert_eq!(reconnect.delay_for(2), Duration::from_millis(2000));
        assert_eq!(reconnect.delay_for(5), Duration::from_millis(16_000));
        assert_eq!(reconnect.delay_for(6), Duration::from_millis(30_000));
        assert_eq!(reconnect.delay_for(100), Duration::from_millis(30_000));
    }
}
