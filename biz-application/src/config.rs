//! 管道配置
//!
//! 加载顺序：显式路径 → `BIZ_CONFIG` 环境变量 → `config.toml`，
//! 最后应用 `BIZ_*` 环境变量覆盖。未找到文件时使用默认值。
//!
//! ```toml
//! slow_request_threshold = "500ms"
//! isolation_level = "read_committed"
//!
//! [retry]
//! max_retries = 3
//! initial_delay = "100ms"
//! max_delay = "5s"
//! ```
use crate::error::AppError;
use crate::transaction::{IsolationLevel, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_ENV: &str = "BIZ_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 超过该耗时的请求记录慢请求告警
    #[serde(with = "humantime_serde")]
    pub slow_request_threshold: Duration,
    pub isolation_level: IsolationLevel,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            slow_request_threshold: Duration::from_millis(500),
            isolation_level: IsolationLevel::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.multiplier < 1.0 || !self.retry.multiplier.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "retry.multiplier must be a finite value >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid(
                "retry.initial_delay must not exceed retry.max_delay".into(),
            ));
        }
        Ok(())
    }

    /// 应用 `BIZ_*` 覆盖项；`lookup` 按变量名取值
    ///
    /// - `BIZ_SLOW_REQUEST_THRESHOLD_MS`
    /// - `BIZ_TX_ISOLATION`
    /// - `BIZ_TX_MAX_RETRIES`
    /// - `BIZ_TX_RETRY_DELAY_MS`
    ///
    /// 无法解析的值被忽略并记录告警。
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("BIZ_SLOW_REQUEST_THRESHOLD_MS") {
            match val.parse() {
                Ok(ms) => self.slow_request_threshold = Duration::from_millis(ms),
                Err(_) => warn!(key = "BIZ_SLOW_REQUEST_THRESHOLD_MS", value = %val, "ignoring override"),
            }
        }
        if let Some(val) = lookup("BIZ_TX_ISOLATION") {
            match val.parse() {
                Ok(level) => self.isolation_level = level,
                Err(_) => warn!(key = "BIZ_TX_ISOLATION", value = %val, "ignoring override"),
            }
        }
        if let Some(val) = lookup("BIZ_TX_MAX_RETRIES") {
            match val.parse() {
                Ok(n) => self.retry.max_retries = n,
                Err(_) => warn!(key = "BIZ_TX_MAX_RETRIES", value = %val, "ignoring override"),
            }
        }
        if let Some(val) = lookup("BIZ_TX_RETRY_DELAY_MS") {
            match val.parse() {
                Ok(ms) => self.retry.initial_delay = Duration::from_millis(ms),
                Err(_) => warn!(key = "BIZ_TX_RETRY_DELAY_MS", value = %val, "ignoring override"),
            }
        }
    }
}

/// 配置加载器
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// 从文件（若存在）加载，再应用环境变量覆盖
    pub fn load(&self) -> Result<PipelineConfig, ConfigError> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                info!(?path, "loading pipeline configuration");
                PipelineConfig::from_file(&path)?
            }
            None => PipelineConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        fallback.exists().then_some(fallback)
    }
}
