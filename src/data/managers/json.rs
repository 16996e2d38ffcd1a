//! JSON 文件后端
//!
//! 整个数据集保存为一个格式化（pretty-print）的 JSON 对象：
//!
//! ```json
//! {
//!   "server": {
//!     "port": 25565
//!   }
//! }
//! ```
//!
//! 无缓存模式下每次单条目操作都会完整地「解码 → 修改 → 编码 → 覆盖写入」，
//! 开销与数据集大小成正比。JSON 后端不提供任何跨进程保护。

use crate::data::backend::{BackendKind, StorageBackend};
use crate::data::value::{sections_from_document, SectionMap};
use crate::data::{DataError, Result};
use crate::utils::file_helpers::{ensure_parent_dir, read_optional, set_private_permissions};
use std::fs;
use std::path::{Path, PathBuf};

/// JSON 文件后端
#[derive(Debug, Clone)]
pub struct JsonBackend {
    path: PathBuf,
}

impl JsonBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for JsonBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Json
    }

    fn load(&self) -> Result<SectionMap> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(SectionMap::new());
        };
        if content.trim().is_empty() {
            return Ok(SectionMap::new());
        }

        let document: serde_json::Value = serde_json::from_str(&content)?;
        let data = sections_from_document(document)?;
        tracing::debug!(path = ?self.path, sections = data.len(), "已加载 JSON 数据");
        Ok(data)
    }

    fn persist(&self, data: &SectionMap) -> Result<()> {
        ensure_parent_dir(&self.path)?;

        let content = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, content).map_err(|e| DataError::io(&self.path, e))?;
        set_private_permissions(&self.path)?;

        tracing::debug!(path = ?self.path, sections = data.len(), "已写入 JSON 数据");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::value::Value;
    use crate::data::ErrorCategory;
    use serde_json::json;
    use tempfile::TempDir;

    fn backend() -> (TempDir, JsonBackend) {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp_dir.path().join("store.json"));
        (temp_dir, backend)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let (_temp_dir, backend) = backend();
        assert!(backend.load().unwrap().is_empty());
        assert!(!backend.path().exists());
    }

    #[test]
    fn test_persist_writes_pretty_object() {
        let (_temp_dir, backend) = backend();
        backend
            .set_entry("server", "port", Value::from(25565))
            .unwrap();

        let content = fs::read_to_string(backend.path()).unwrap();
        assert!(content.contains('\n'), "应为格式化输出");
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, json!({"server": {"port": 25565}}));
    }

    #[test]
    fn test_entry_operations() {
        let (_temp_dir, backend) = backend();

        backend.set_entry("server", "port", Value::from(1)).unwrap();
        backend.set_entry("server", "port", Value::from(2)).unwrap();
        assert_eq!(backend.get_entry("server", "port").unwrap(), Some(Value::from(2)));

        backend.delete_entry("server", "port").unwrap();
        assert_eq!(backend.get_entry("server", "port").unwrap(), None);
        // 文件后端可以保留空 section
        assert!(backend.has_section("server").unwrap());
        assert!(backend.list_keys("server").unwrap().is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_parse_error() {
        let (_temp_dir, backend) = backend();
        fs::write(backend.path(), "{not json").unwrap();

        let err = backend.load().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);
    }

    #[test]
    fn test_load_legacy_empty_section_list() {
        let (_temp_dir, backend) = backend();
        fs::write(backend.path(), r#"{"players": [], "server": {"port": 1}}"#).unwrap();

        let data = backend.load().unwrap();
        assert!(data["players"].is_empty());
        assert_eq!(backend.list_sections().unwrap(), vec!["players", "server"]);
    }

    #[test]
    fn test_persist_creates_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp_dir.path().join("nested").join("store.json"));
        backend.persist(&SectionMap::new()).unwrap();
        assert!(backend.path().exists());
    }

    #[test]
    fn test_persist_into_directory_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp_dir.path());
        let err = backend.persist(&SectionMap::new()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[test]
    #[cfg(unix)]
    fn test_permissions_unix() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp_dir, backend) = backend();
        backend.persist(&SectionMap::new()).unwrap();

        let perms = fs::metadata(backend.path()).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
