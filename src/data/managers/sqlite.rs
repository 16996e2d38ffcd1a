//! SQLite 文件后端
//!
//! 数据保存在单表 `storage(section, key, value)` 中，主键为 `(section, key)`，
//! `value` 列存放值的 JSON 文本，读取时解码，因此与文件类后端共享同一个值模型。
//!
//! - 所有语句都是参数化的，不拼接 SQL
//! - 单条目操作直接映射为单条语句
//! - `persist` 在一个事务内清空并重写整张表
//! - 连接通过 [`ConnectionRegistry`] 按路径共享，每次访问前确保连接可用
//!
//! SQLite 无法表示空 section：删除 section 的最后一个 key 后该 section 即不存在。

use crate::data::backend::{BackendKind, StorageBackend};
use crate::data::connection::{ConnectionHandle, ConnectionRegistry, RetryPolicy};
use crate::data::value::{decode_json, encode_json, SectionMap, Value};
use crate::data::Result;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// SQLite 文件后端
#[derive(Debug)]
pub struct SqliteBackend {
    handle: ConnectionHandle,
}

impl SqliteBackend {
    /// 使用全局注册表和默认重试策略打开
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, ConnectionRegistry::global(), RetryPolicy::default())
    }

    /// 使用指定注册表和重试策略打开
    pub fn open_with(
        path: &Path,
        registry: &ConnectionRegistry,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let handle = registry.open(path, policy)?;
        Ok(Self { handle })
    }

    /// 解析后的数据库路径
    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// 显式归还连接
    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

impl StorageBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn load(&self) -> Result<SectionMap> {
        let rows = self.handle.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT section, key, value FROM storage ORDER BY section, key")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut data = SectionMap::new();
        for (section, key, text) in rows {
            data.entry(section)
                .or_default()
                .insert(key, decode_json(&text)?);
        }
        tracing::debug!(path = ?self.path(), sections = data.len(), "已加载 SQLite 数据");
        Ok(data)
    }

    fn persist(&self, data: &SectionMap) -> Result<()> {
        // 先在事务外完成编码，避免半途失败
        let mut encoded = Vec::new();
        for (section, entries) in data {
            for (key, value) in entries {
                encoded.push((section.as_str(), key.as_str(), encode_json(value)?));
            }
        }

        self.handle.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM storage", [])?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO storage (section, key, value) VALUES (?1, ?2, ?3)")?;
                for (section, key, text) in &encoded {
                    stmt.execute(params![section, key, text])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;

        tracing::debug!(path = ?self.path(), rows = encoded.len(), "已写入 SQLite 数据");
        Ok(())
    }

    fn get_entry(&self, section: &str, key: &str) -> Result<Option<Value>> {
        let text: Option<String> = self.handle.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM storage WHERE section = ?1 AND key = ?2",
                    params![section, key],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        text.map(|t| decode_json(&t)).transpose()
    }

    fn set_entry(&self, section: &str, key: &str, value: Value) -> Result<()> {
        let text = encode_json(&value)?;
        self.handle.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO storage (section, key, value) VALUES (?1, ?2, ?3)",
                params![section, key, text],
            )?;
            Ok(())
        })
    }

    fn delete_entry(&self, section: &str, key: &str) -> Result<()> {
        self.handle.with_connection(|conn| {
            conn.execute(
                "DELETE FROM storage WHERE section = ?1 AND key = ?2",
                params![section, key],
            )?;
            Ok(())
        })
    }

    fn remove_section(&self, section: &str) -> Result<()> {
        self.handle.with_connection(|conn| {
            conn.execute("DELETE FROM storage WHERE section = ?1", params![section])?;
            Ok(())
        })
    }

    fn has_section(&self, section: &str) -> Result<bool> {
        self.handle.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM storage WHERE section = ?1)",
                params![section],
                |row| row.get(0),
            )?)
        })
    }

    fn list_keys(&self, section: &str) -> Result<Vec<String>> {
        self.handle.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM storage WHERE section = ?1 ORDER BY key")?;
            let keys = stmt
                .query_map(params![section], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }

    fn list_sections(&self) -> Result<Vec<String>> {
        self.handle.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT section FROM storage ORDER BY section")?;
            let sections = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(sections)
        })
    }
}
