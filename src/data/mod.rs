//! 分段键值存储
//!
//! 数据按 (section, key) 两级寻址，值为 JSON 兼容的 [`Value`]。
//! 同一套接口可以落到 JSON 文件、YAML 文件或 SQLite 数据库上，并可叠加内存缓存与事务。
//!
//! # 模块组织
//!
//! - `error`: 统一错误类型定义
//! - `value`: 值模型与 JSON 编解码
//! - `backend`: 后端能力 trait 与后端枚举
//! - `managers`: 各后端实现（JSON/YAML/SQLite）与宿主配置适配器
//! - `connection`: SQLite 连接管理（重试、完整性检查、共享连接）
//! - `cache`: 缓存层（整体快照写回）
//! - `transaction`: 事务状态机
//! - `manager`: 统一入口 `Database`
//!
//! # 使用示例
//!
//! ```rust
//! use crate::data::{BackendKind, Database};
//!
//! let mut db = Database::create("plugin_data/store.db", BackendKind::Sqlite, true)?;
//! db.set("server", "port", 25565)?;
//! let keys = db.list_keys("server")?;
//! ```

pub mod backend;
pub mod cache;
pub mod connection;
pub mod error;
pub mod manager;
pub mod managers;
pub mod transaction;
pub mod value;


pub use backend::{Backend, BackendKind, StorageBackend};
pub use connection::{ConnectionHandle, ConnectionRegistry, RetryPolicy};
pub use error::{DataError, ErrorCategory, Result};
pub use manager::{Database, DatabaseOptions};
pub use transaction::{TransactionManager, TransactionState};
pub use value::{Section, SectionMap, Value};
