// 存储与日志配置结构，供库和调用方共享
use crate::data::backend::BackendKind;
use crate::data::connection::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::data::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_use_cache() -> bool {
    true
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>, kind: BackendKind) -> Self {
        Self {
            path: path.into(),
            kind,
            use_cache: default_use_cache(),
            retry: RetryConfig::default(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Into::into)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(Into::into)
    }
}

/// SQLite 连接重试配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// 日志输出目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

/// 日志配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub output: LogOutput,
    /// 日志目录（文件输出时使用，默认数据目录下的 sectiondb/logs）
    #[serde(default)]
    pub file_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::from_json_str(r#"{"path": "data/store.yml"}"#).unwrap();
        assert_eq!(config.kind, BackendKind::Yaml);
        assert!(config.use_cache);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_store_config_from_yaml() {
        let config = StoreConfig::from_yaml_str(
            "path: data/store.db\nkind: sqlite\nuse_cache: false\nretry:\n  max_attempts: 3\n  delay_ms: 10\n",
        )
        .unwrap();
        assert_eq!(config.kind, BackendKind::Sqlite);
        assert!(!config.use_cache);

        let policy = config.retry.to_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_store_config_requires_path() {
        assert!(StoreConfig::from_json_str("{}").is_err());
    }

    #[test]
    fn test_log_config_serde() {
        let config: LogConfig =
            serde_json::from_str(r#"{"level": "debug", "format": "json", "output": "both"}"#)
                .unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Both);
        assert_eq!(config.file_path, None);
        assert_eq!(LogConfig::default().level.as_str(), "info");
    }
}
