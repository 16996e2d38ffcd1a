//! 存储后端实现
//!
//! - `json`: JSON 文件后端（整文档读写）
//! - `yaml`: YAML 文件后端（整文档读写，写入时持有排他文件锁）
//! - `sqlite`: SQLite 文件后端（单表，参数化语句，共享连接）
//! - `host`: 宿主配置对象适配器（section 粒度）

pub mod host;
pub mod json;
pub mod sqlite;
pub mod yaml;

pub use host::{HostConfig, HostConfigStore};
pub use json::JsonBackend;
pub use sqlite::SqliteBackend;
pub use yaml::YamlBackend;
