//! 统一错误类型定义
//!
//! 使用 `thiserror` 定义存储模块的所有错误类型，并提供与 `anyhow` 的兼容层。
//! 调用方可以通过 [`DataError::category`] 按错误类别（I/O、解析、完整性、连接、逻辑）分支处理。

use std::path::PathBuf;
use thiserror::Error;

/// 存储模块的统一错误类型
#[derive(Error, Debug)]
pub enum DataError {
    /// 文件 I/O 错误（创建目录/文件、权限、写入失败）
    #[error("文件 I/O 错误: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON 序列化/反序列化错误
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 文档结构不符合 section -> key -> value 模型
    #[error("数据格式错误: {0}")]
    Parse(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    /// 数据库文件未通过完整性检查
    #[error("完整性检查失败: {path}: {detail}")]
    Integrity { path: PathBuf, detail: String },

    /// 重试次数耗尽仍无法建立可用连接
    #[error("数据库连接失败: {path}: 已尝试 {attempts} 次，最后一次错误: {last_error}")]
    Connection {
        path: PathBuf,
        attempts: u32,
        last_error: String,
    },

    /// API 使用错误（事务状态不匹配、section 不存在等）
    #[error("逻辑错误: {0}")]
    Logic(String),

    /// 并发错误（锁中毒）
    #[error("并发错误: {0}")]
    Concurrency(String),
}

/// 便于与现有代码集成的类型别名
pub type Result<T> = std::result::Result<T, DataError>;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Parse,
    Integrity,
    Connection,
    Logic,
    /// 其余存储引擎错误
    Storage,
}

impl DataError {
    /// 从 `std::io::Error` 和路径创建 I/O 错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// 创建逻辑错误
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            DataError::Io { .. } => ErrorCategory::Io,
            DataError::Json(_) | DataError::Yaml(_) | DataError::Parse(_) => ErrorCategory::Parse,
            DataError::Integrity { .. } => ErrorCategory::Integrity,
            DataError::Connection { .. } => ErrorCategory::Connection,
            DataError::Logic(_) => ErrorCategory::Logic,
            DataError::Database(_) | DataError::Concurrency(_) => ErrorCategory::Storage,
        }
    }
}
