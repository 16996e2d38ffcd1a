//! SQLite 连接管理
//!
//! 负责 SQLite 后端的连接生命周期：
//! - 文件准备：创建父目录、创建空文件、检查可写（失败直接返回 I/O 错误，不重试）
//! - 有界重试：打开连接并立即执行 `PRAGMA integrity_check`，任一步失败则等待固定间隔后重试
//! - 表结构初始化：`CREATE TABLE IF NOT EXISTS`
//! - 共享连接：[`ConnectionRegistry`] 按解析后的绝对路径复用连接，引用计数归零时关闭
//! - 延迟重建：连接句柄为空（打开失败、或检测到文件损坏后被丢弃）时，下次访问重新走完整流程
//!
//! # 使用示例
//!
//! ```rust
//! use crate::data::connection::{ConnectionRegistry, RetryPolicy};
//!
//! let registry = ConnectionRegistry::new();
//! let handle = registry.open(Path::new("data/store.db"), RetryPolicy::default())?;
//! let count: i64 = handle.with_connection(|conn| {
//!     Ok(conn.query_row("SELECT COUNT(*) FROM storage", [], |row| row.get(0))?)
//! })?;
//! handle.close()?;
//! ```

use crate::data::{DataError, Result};
use once_cell::sync::Lazy;
use rusqlite::{Connection, ErrorCode};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 键值表结构
pub const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS storage (
    section TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (section, key)
)";

/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// 默认重试间隔
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// 全局连接注册表
static GLOBAL_REGISTRY: Lazy<ConnectionRegistry> = Lazy::new(ConnectionRegistry::new);

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// 有界重试策略
///
/// 两次尝试之间调用 `sleeper` 等待固定间隔，默认是 `std::thread::sleep`；
/// 测试中可以注入不等待的实现。
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    sleeper: Sleeper,
}

impl RetryPolicy {
    /// `max_attempts` 至少为 1
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    /// 替换等待函数
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 执行操作直到成功或尝试次数耗尽
    ///
    /// 返回最后一次的错误和实际尝试次数。
    pub fn run<T>(
        &self,
        mut op: impl FnMut(u32) -> Result<T>,
    ) -> std::result::Result<T, (DataError, u32)> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err((e, attempt)),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "操作失败，等待后重试"
                    );
                    (self.sleeper)(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// 按路径共享的持久连接
pub struct SharedConnection {
    path: PathBuf,
    policy: RetryPolicy,
    conn: Mutex<Option<Connection>>,
}

impl SharedConnection {
    fn new(path: PathBuf, policy: RetryPolicy) -> Self {
        Self {
            path,
            policy,
            conn: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 当前是否持有已打开的连接
    pub fn is_open(&self) -> bool {
        self.conn.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// 在连接上执行操作
    ///
    /// 连接为空时先完成准备、重试打开和表结构初始化。
    /// 操作报告文件损坏时丢弃连接，下次访问重新打开。
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut slot = self
            .conn
            .lock()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;

        if slot.is_none() {
            *slot = Some(self.establish()?);
        }
        let Some(conn) = slot.as_mut() else {
            return Err(DataError::Concurrency("连接初始化后仍为空".into()));
        };

        let result = f(conn);
        if let Err(DataError::Database(e)) = &result {
            if is_corruption(e) {
                tracing::warn!(path = ?self.path, error = %e, "检测到数据库文件损坏，丢弃连接");
                *slot = None;
            }
        }
        result
    }

    /// 关闭连接（幂等）
    pub fn close(&self) -> Result<()> {
        let mut slot = self
            .conn
            .lock()
            .map_err(|e| DataError::Concurrency(e.to_string()))?;
        if let Some(conn) = slot.take() {
            conn.close().map_err(|(_, e)| DataError::Database(e))?;
            tracing::info!(path = ?self.path, "SQLite 连接已关闭");
        }
        Ok(())
    }

    /// 准备文件 → 重试打开并校验 → 初始化表结构
    fn establish(&self) -> Result<Connection> {
        provision(&self.path)?;

        let conn = self
            .policy
            .run(|attempt| {
                let conn = Connection::open(&self.path)?;
                verify_integrity(&conn, &self.path)?;
                tracing::debug!(path = ?self.path, attempt, "SQLite 连接通过完整性检查");
                Ok(conn)
            })
            .map_err(|(last_error, attempts)| {
                tracing::error!(
                    path = ?self.path,
                    attempts,
                    error = %last_error,
                    "SQLite 连接重试次数耗尽"
                );
                DataError::Connection {
                    path: self.path.clone(),
                    attempts,
                    last_error: last_error.to_string(),
                }
            })?;

        conn.execute_batch(SCHEMA_SQL)?;
        tracing::info!(path = ?self.path, "SQLite 连接已建立");
        Ok(conn)
    }
}

/// 连接注册表
///
/// 以解析后的绝对路径为键，引用计数管理共享连接。克隆得到的是同一个注册表。
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<Mutex<HashMap<PathBuf, RegistryEntry>>>,
}

struct RegistryEntry {
    shared: Arc<SharedConnection>,
    handles: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级默认注册表
    pub fn global() -> &'static ConnectionRegistry {
        &GLOBAL_REGISTRY
    }

    /// 打开（或复用）指定路径的连接
    ///
    /// 同一路径已打开时复用已有连接，`policy` 仅在首次打开时生效。
    pub fn open(&self, path: &Path, policy: RetryPolicy) -> Result<ConnectionHandle> {
        provision(path)?;
        let key = resolve_path(path)?;

        let shared = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| DataError::Concurrency(e.to_string()))?;
            let entry = entries.entry(key.clone()).or_insert_with(|| RegistryEntry {
                shared: Arc::new(SharedConnection::new(key.clone(), policy)),
                handles: 0,
            });
            entry.handles += 1;
            Arc::clone(&entry.shared)
        };

        let handle = ConnectionHandle {
            shared,
            registry: self.clone(),
            key,
            released: false,
        };

        // 立即建立连接，失败时句柄 drop 会归还引用
        handle.with_connection(|_| Ok(()))?;
        Ok(handle)
    }

    /// 指定路径当前的句柄数量
    pub fn handle_count(&self, path: &Path) -> usize {
        let Ok(key) = resolve_path(path) else {
            return 0;
        };
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&key).map(|entry| entry.handles))
            .unwrap_or(0)
    }

    /// 已注册的路径数量
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, key: &Path) -> Result<()> {
        let closing = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| DataError::Concurrency(e.to_string()))?;
            let Some(entry) = entries.get_mut(key) else {
                return Ok(());
            };
            entry.handles = entry.handles.saturating_sub(1);
            if entry.handles == 0 {
                entries.remove(key).map(|entry| entry.shared)
            } else {
                None
            }
        };

        match closing {
            Some(shared) => shared.close(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("paths", &self.len())
            .finish()
    }
}

/// 共享连接的句柄
///
/// 显式 [`close`](ConnectionHandle::close) 或 drop 时归还引用，最后一个句柄归还时关闭连接。
pub struct ConnectionHandle {
    shared: Arc<SharedConnection>,
    registry: ConnectionRegistry,
    key: PathBuf,
    released: bool,
}

impl ConnectionHandle {
    pub fn path(&self) -> &Path {
        &self.key
    }

    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        self.shared.with_connection(f)
    }

    /// 两个句柄是否共享同一个连接
    pub fn shares_connection_with(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// 归还句柄
    pub fn close(mut self) -> Result<()> {
        self.released = true;
        self.registry.release(&self.key)
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.registry.release(&self.key) {
            tracing::warn!(path = ?self.key, error = %e, "归还 SQLite 连接失败");
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("path", &self.key)
            .field("open", &self.is_open())
            .finish()
    }
}

/// 准备数据库文件：父目录、空文件、可写检查
pub fn provision(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
            tracing::debug!(dir = ?parent, "已创建数据库目录");
        }
    }

    // 以追加方式打开：不存在则创建空文件，只读文件在这里失败
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| DataError::io(path, e))?;

    let metadata = fs::metadata(path).map_err(|e| DataError::io(path, e))?;
    if metadata.permissions().readonly() {
        return Err(DataError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "数据库文件不可写"),
        ));
    }
    Ok(())
}

/// 结构完整性检查：`PRAGMA integrity_check` 必须只返回 `ok`
pub fn verify_integrity(conn: &Connection, path: &Path) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.len() == 1 && rows[0] == "ok" {
        Ok(())
    } else {
        Err(DataError::Integrity {
            path: path.to_path_buf(),
            detail: rows.join("; "),
        })
    }
}

/// 解析为绝对、规范化路径（文件必须已存在）
fn resolve_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|e| DataError::io(path, e))
}

fn is_corruption(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ErrorCategory;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn counting_policy(max_attempts: u32) -> (RetryPolicy, Arc<AtomicU32>) {
        let sleeps = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&sleeps);
        let policy = RetryPolicy::new(max_attempts, Duration::from_secs(30)).with_sleeper(
            move |delay| {
                assert_eq!(delay, Duration::from_secs(30));
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        (policy, sleeps)
    }

    fn write_garbage(path: &Path) {
        fs::write(path, vec![0x5a_u8; 4096]).unwrap();
    }

    /// 建一个带索引、数据量足够跨越多个页的真实数据库
    fn build_populated(path: &Path) {
        let mut conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE INDEX items_name ON items (name);",
        )
        .unwrap();
        let tx = conn.transaction().unwrap();
        for i in 0..2000 {
            tx.execute(
                "INSERT INTO items (id, name) VALUES (?1, ?2)",
                rusqlite::params![i, format!("item-{:05}-{}", i, "x".repeat(40))],
            )
            .unwrap();
        }
        tx.commit().unwrap();
    }

    /// 保留文件头，覆盖文件中段的页
    fn smash_middle(path: &Path) {
        let mut bytes = fs::read(path).unwrap();
        let middle = bytes.len() / 2;
        assert!(middle > 4096, "数据库文件过小");
        for byte in &mut bytes[middle..middle + 3000] {
            *byte = 0xa5;
        }
        fs::write(path, bytes).unwrap();
    }

    /// 改写索引定义，让索引内容与表数据不一致；文件结构本身仍然可读
    fn break_index_definition(path: &Path) {
        build_populated(path);
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "PRAGMA writable_schema = ON;
             UPDATE sqlite_master SET sql = 'CREATE INDEX items_name ON items (id)'
                 WHERE name = 'items_name';
             PRAGMA writable_schema = OFF;",
        )
        .unwrap();
    }

    #[test]
    fn test_retry_policy_succeeds_after_failures() {
        let (policy, sleeps) = counting_policy(5);
        let result = policy.run(|attempt| {
            if attempt < 3 {
                Err(DataError::logic("暂时失败"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(sleeps.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retry_policy_exhaustion() {
        let (policy, sleeps) = counting_policy(5);
        let (err, attempts) = policy
            .run::<()>(|_| Err(DataError::logic("一直失败")))
            .unwrap_err();
        assert_eq!(attempts, 5);
        assert!(matches!(err, DataError::Logic(_)));
        assert_eq!(sleeps.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_retry_policy_minimum_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_provision_creates_directory_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("a").join("b").join("store.db");

        provision(&db_path).unwrap();

        assert!(db_path.parent().unwrap().is_dir());
        assert_eq!(fs::metadata(&db_path).unwrap().len(), 0);
    }

    #[test]
    fn test_provision_fails_when_parent_is_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let err = provision(&blocker.join("store.db")).unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }

    #[test]
    fn test_open_initializes_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        let registry = ConnectionRegistry::new();

        let handle = registry.open(&db_path, RetryPolicy::default()).unwrap();
        let tables: i64 = handle
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='storage'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_open_corrupt_file_exhausts_retries() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        write_garbage(&db_path);

        let registry = ConnectionRegistry::new();
        let (policy, sleeps) = counting_policy(5);
        let err = registry.open(&db_path, policy).unwrap_err();

        match err {
            DataError::Connection { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("期望连接错误，实际为 {other:?}"),
        }
        assert_eq!(sleeps.load(Ordering::SeqCst), 4);
        // 打开失败的句柄已归还
        assert!(registry.is_empty());
    }

    #[test]
    fn test_open_damaged_pages_exhausts_retries() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        build_populated(&db_path);
        smash_middle(&db_path);

        let registry = ConnectionRegistry::new();
        let (policy, sleeps) = counting_policy(5);
        match registry.open(&db_path, policy).unwrap_err() {
            DataError::Connection { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("期望连接错误，实际为 {other:?}"),
        }
        assert_eq!(sleeps.load(Ordering::SeqCst), 4);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_verify_integrity_rejects_damaged_pages() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        build_populated(&db_path);
        smash_middle(&db_path);

        // 文件头完好，打开本身可以成功
        let conn = Connection::open(&db_path).unwrap();
        let err = verify_integrity(&conn, &db_path).unwrap_err();
        assert!(
            matches!(err, DataError::Integrity { .. }) || err.category() == ErrorCategory::Storage,
            "损坏的页应该被拒绝，实际为 {err:?}"
        );
    }

    #[test]
    fn test_verify_integrity_reports_inconsistent_index() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        break_index_definition(&db_path);

        let conn = Connection::open(&db_path).unwrap();
        match verify_integrity(&conn, &db_path).unwrap_err() {
            DataError::Integrity { path, detail } => {
                assert_eq!(path, db_path);
                assert!(detail.contains("items_name"), "检查结果应该指出索引: {detail}");
            }
            other => panic!("期望完整性错误，实际为 {other:?}"),
        }
    }

    #[test]
    fn test_open_inconsistent_index_exhausts_retries() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        break_index_definition(&db_path);

        let registry = ConnectionRegistry::new();
        let (policy, sleeps) = counting_policy(5);
        match registry.open(&db_path, policy).unwrap_err() {
            DataError::Connection {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 5);
                assert!(last_error.contains("完整性检查失败"), "{last_error}");
            }
            other => panic!("期望连接错误，实际为 {other:?}"),
        }
        assert_eq!(sleeps.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_verify_integrity_accepts_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        verify_integrity(&conn, Path::new(":memory:")).unwrap();
    }

    #[test]
    fn test_registry_shares_connection_per_path() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        let other_path = temp_dir.path().join("other.db");
        let registry = ConnectionRegistry::new();

        let first = registry.open(&db_path, RetryPolicy::default()).unwrap();
        // 不同写法的同一路径
        let alias = temp_dir.path().join(".").join("store.db");
        let second = registry.open(&alias, RetryPolicy::default()).unwrap();
        let other = registry.open(&other_path, RetryPolicy::default()).unwrap();

        assert!(first.shares_connection_with(&second));
        assert!(!first.shares_connection_with(&other));
        assert_eq!(registry.handle_count(&db_path), 2);
        assert_eq!(registry.len(), 2);

        first.close().unwrap();
        assert_eq!(registry.handle_count(&db_path), 1);
        assert!(second.is_open());

        drop(second);
        assert_eq!(registry.handle_count(&db_path), 0);
        assert_eq!(registry.len(), 1);
        drop(other);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lazy_reopen_after_corruption_detected() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        let registry = ConnectionRegistry::new();
        let handle = registry.open(&db_path, RetryPolicy::default()).unwrap();

        let result: Result<()> = handle.with_connection(|_| {
            Err(DataError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
                None,
            )))
        });
        assert!(result.is_err());
        assert!(!handle.is_open());

        // 下次访问自动重建
        handle.with_connection(|_| Ok(())).unwrap();
        assert!(handle.is_open());
    }
}
