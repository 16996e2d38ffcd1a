//! 统一数据库入口
//!
//! [`Database`] 是调用方唯一需要使用的类型，它把选定的后端与可选的缓存层、事务层组合起来：
//! - 启用缓存：所有操作路由到 [`CachedStore`]（内存读、整体快照写回）
//! - 禁用缓存：直接调用后端的单条目操作
//!
//! # 使用示例
//!
//! ```rust
//! use crate::data::{BackendKind, Database, Value};
//!
//! let mut db = Database::create("plugin_data/server.yml", BackendKind::Yaml, true)?;
//! db.set("server", "port", Value::from(25565))?;
//! assert_eq!(db.get("server", "port")?, Some(Value::from(25565)));
//!
//! db.start_transaction()?;
//! db.set("server", "motd", Value::from("maintenance"))?;
//! db.rollback_transaction()?;
//! ```

use crate::data::backend::{Backend, BackendKind, StorageBackend};
use crate::data::cache::CachedStore;
use crate::data::connection::{ConnectionRegistry, RetryPolicy};
use crate::data::managers::{JsonBackend, SqliteBackend, YamlBackend};
use crate::data::value::Value;
use crate::data::{DataError, Result};
use crate::models::config::StoreConfig;
use std::path::{Path, PathBuf};

/// 数据库打开选项
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    path: PathBuf,
    kind: BackendKind,
    use_cache: bool,
    retry: RetryPolicy,
    registry: Option<ConnectionRegistry>,
}

impl DatabaseOptions {
    /// 默认：YAML 后端、启用缓存、默认重试策略、全局连接注册表
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: BackendKind::default(),
            use_cache: true,
            retry: RetryPolicy::default(),
            registry: None,
        }
    }

    pub fn kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// SQLite 后端的连接重试策略
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// SQLite 后端使用的连接注册表
    pub fn registry(mut self, registry: ConnectionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn open(self) -> Result<Database> {
        Database::open(self)
    }
}

impl From<&StoreConfig> for DatabaseOptions {
    fn from(config: &StoreConfig) -> Self {
        DatabaseOptions::new(config.path.clone())
            .kind(config.kind)
            .use_cache(config.use_cache)
            .retry_policy(config.retry.to_policy())
    }
}

enum Store {
    Direct(Backend),
    Cached(CachedStore),
}

/// 按 (section, key) 寻址的键值数据库
pub struct Database {
    file_path: PathBuf,
    store: Store,
}

impl Database {
    /// 工厂入口：按类型创建数据库
    pub fn create(path: impl Into<PathBuf>, kind: BackendKind, use_cache: bool) -> Result<Self> {
        DatabaseOptions::new(path)
            .kind(kind)
            .use_cache(use_cache)
            .open()
    }

    /// 按配置创建数据库
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        DatabaseOptions::from(config).open()
    }

    pub fn open(options: DatabaseOptions) -> Result<Self> {
        let DatabaseOptions {
            path,
            kind,
            use_cache,
            retry,
            registry,
        } = options;

        let backend = match kind {
            BackendKind::Json => Backend::Json(JsonBackend::new(&path)),
            BackendKind::Yaml => Backend::Yaml(YamlBackend::new(&path)),
            BackendKind::Sqlite => {
                let registry = registry.unwrap_or_else(|| ConnectionRegistry::global().clone());
                Backend::Sqlite(SqliteBackend::open_with(&path, &registry, retry)?)
            }
        };

        let store = if use_cache {
            Store::Cached(CachedStore::load(backend)?)
        } else {
            Store::Direct(backend)
        };

        tracing::info!(path = ?path, kind = %kind, use_cache, "数据库已打开");
        Ok(Self {
            file_path: path,
            store,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn kind(&self) -> BackendKind {
        self.backend().kind()
    }

    pub fn uses_cache(&self) -> bool {
        matches!(self.store, Store::Cached(_))
    }

    pub fn backend(&self) -> &Backend {
        match &self.store {
            Store::Direct(backend) => backend,
            Store::Cached(cached) => cached.backend(),
        }
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match &mut self.store {
            Store::Direct(backend) => backend.set_entry(section, key, value),
            Store::Cached(cached) => cached.set(section, key, value),
        }
    }

    /// 读取条目；不存在时返回 `None`
    pub fn get(&self, section: &str, key: &str) -> Result<Option<Value>> {
        match &self.store {
            Store::Direct(backend) => backend.get_entry(section, key),
            Store::Cached(cached) => Ok(cached.get(section, key)),
        }
    }

    /// 删除条目；条目不存在时不报错
    pub fn delete(&mut self, section: &str, key: &str) -> Result<()> {
        match &mut self.store {
            Store::Direct(backend) => backend.delete_entry(section, key),
            Store::Cached(cached) => cached.delete(section, key),
        }
    }

    /// 删除整个 section；不存在时不报错
    pub fn remove_section(&mut self, section: &str) -> Result<()> {
        match &mut self.store {
            Store::Direct(backend) => backend.remove_section(section),
            Store::Cached(cached) => cached.remove_section(section),
        }
    }

    pub fn has_section(&self, section: &str) -> Result<bool> {
        match &self.store {
            Store::Direct(backend) => backend.has_section(section),
            Store::Cached(cached) => Ok(cached.has_section(section)),
        }
    }

    /// section 下的 key（字典序）；section 不存在时为空
    pub fn list_keys(&self, section: &str) -> Result<Vec<String>> {
        match &self.store {
            Store::Direct(backend) => backend.list_keys(section),
            Store::Cached(cached) => Ok(cached.list_keys(section)),
        }
    }

    pub fn list_sections(&self) -> Result<Vec<String>> {
        match &self.store {
            Store::Direct(backend) => backend.list_sections(),
            Store::Cached(cached) => Ok(cached.list_sections()),
        }
    }

    pub fn in_transaction(&self) -> bool {
        match &self.store {
            Store::Direct(_) => false,
            Store::Cached(cached) => cached.in_transaction(),
        }
    }

    /// 开始事务（仅缓存模式）
    pub fn start_transaction(&mut self) -> Result<()> {
        self.cached_mut()?.start_transaction()
    }

    pub fn commit_transaction(&mut self) -> Result<()> {
        self.cached_mut()?.commit_transaction()
    }

    pub fn rollback_transaction(&mut self) -> Result<()> {
        self.cached_mut()?.rollback_transaction()
    }

    fn cached_mut(&mut self) -> Result<&mut CachedStore> {
        match &mut self.store {
            Store::Cached(cached) => Ok(cached),
            Store::Direct(_) => Err(DataError::logic("事务仅在启用缓存时可用")),
        }
    }
}
