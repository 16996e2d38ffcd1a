// lib.rs - 分段键值存储库的公共入口

pub mod core;
pub mod data;
pub mod models;
pub mod utils;

pub use core::{init_logger, update_log_level};
pub use data::{
    Backend, BackendKind, ConnectionRegistry, DataError, Database, DatabaseOptions,
    ErrorCategory, Result, RetryPolicy, Section, SectionMap, StorageBackend, Value,
};
pub use data::managers::{HostConfig, HostConfigStore};
pub use models::config::{LogConfig, LogFormat, LogLevel, LogOutput, RetryConfig, StoreConfig};
