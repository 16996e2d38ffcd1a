//! 存储后端契约
//!
//! 所有后端实现同一个能力接口 [`StorageBackend`]：整体加载、整体持久化、单条目读写删除和列举。
//! 文件类后端只需实现 `load` / `persist`，单条目操作默认按「加载全部 → 修改 → 写回全部」完成；
//! SQLite 后端覆盖这些方法，改为单条参数化语句。
//!
//! 具体后端在构造时通过 [`Backend`] 枚举分发。

use crate::data::managers::{JsonBackend, SqliteBackend, YamlBackend};
use crate::data::value::{SectionMap, Value};
use crate::data::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Json,
    #[default]
    Yaml,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Json => "json",
            BackendKind::Yaml => "yaml",
            BackendKind::Sqlite => "sqlite",
        }
    }

    /// 宽松解析：大小写不敏感，未知类型回退到 YAML
    pub fn parse_lenient(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "json" => BackendKind::Json,
            "sqlite" => BackendKind::Sqlite,
            _ => BackendKind::Yaml,
        }
    }
}

impl FromStr for BackendKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse_lenient(s))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 存储后端能力接口
pub trait StorageBackend {
    /// 后端类型
    fn kind(&self) -> BackendKind;

    /// 加载完整数据集；尚未持久化任何数据时返回空映射
    fn load(&self) -> Result<SectionMap>;

    /// 用给定数据集覆盖整个存储
    fn persist(&self, data: &SectionMap) -> Result<()>;

    fn get_entry(&self, section: &str, key: &str) -> Result<Option<Value>> {
        let mut data = self.load()?;
        Ok(data.get_mut(section).and_then(|entries| entries.remove(key)))
    }

    fn set_entry(&self, section: &str, key: &str, value: Value) -> Result<()> {
        let mut data = self.load()?;
        data.entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.persist(&data)
    }

    /// 删除条目；条目不存在时不报错
    fn delete_entry(&self, section: &str, key: &str) -> Result<()> {
        let mut data = self.load()?;
        if let Some(entries) = data.get_mut(section) {
            entries.remove(key);
        }
        self.persist(&data)
    }

    /// 删除整个 section；section 不存在时不报错
    fn remove_section(&self, section: &str) -> Result<()> {
        let mut data = self.load()?;
        data.remove(section);
        self.persist(&data)
    }

    fn has_section(&self, section: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(section))
    }

    /// 列出 section 下的所有 key（字典序）；section 不存在时返回空列表
    fn list_keys(&self, section: &str) -> Result<Vec<String>> {
        let data = self.load()?;
        Ok(data
            .get(section)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// 列出所有 section（字典序）
    fn list_sections(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_keys().collect())
    }
}

/// 构造时选定的具体后端
pub enum Backend {
    Json(JsonBackend),
    Yaml(YamlBackend),
    Sqlite(SqliteBackend),
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $body:expr) => {
        match $self {
            Backend::Json($backend) => $body,
            Backend::Yaml($backend) => $body,
            Backend::Sqlite($backend) => $body,
        }
    };
}

impl StorageBackend for Backend {
    fn kind(&self) -> BackendKind {
        dispatch!(self, b => b.kind())
    }

    fn load(&self) -> Result<SectionMap> {
        dispatch!(self, b => b.load())
    }

    fn persist(&self, data: &SectionMap) -> Result<()> {
        dispatch!(self, b => b.persist(data))
    }

    fn get_entry(&self, section: &str, key: &str) -> Result<Option<Value>> {
        dispatch!(self, b => b.get_entry(section, key))
    }

    fn set_entry(&self, section: &str, key: &str, value: Value) -> Result<()> {
        dispatch!(self, b => b.set_entry(section, key, value))
    }

    fn delete_entry(&self, section: &str, key: &str) -> Result<()> {
        dispatch!(self, b => b.delete_entry(section, key))
    }

    fn remove_section(&self, section: &str) -> Result<()> {
        dispatch!(self, b => b.remove_section(section))
    }

    fn has_section(&self, section: &str) -> Result<bool> {
        dispatch!(self, b => b.has_section(section))
    }

    fn list_keys(&self, section: &str) -> Result<Vec<String>> {
        dispatch!(self, b => b.list_keys(section))
    }

    fn list_sections(&self) -> Result<Vec<String>> {
        dispatch!(self, b => b.list_sections())
    }
}
