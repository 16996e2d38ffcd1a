//! YAML 文件后端
//!
//! 与 JSON 后端相同的整文档模型，序列化为 UTF-8 YAML。
//!
//! 写入时在文件句柄上获取排他咨询锁（`fs2`），持有锁期间截断、写入并刷盘，
//! 锁由 [`WriteLock`] 在离开作用域时释放（包括出错返回）。
//!
//! 读取不加锁：在写入窗口之外打开文件的读者可能看到写了一半的内容。
//! 消除这个窗口需要读写锁协议，当前未实现。

use crate::data::backend::{BackendKind, StorageBackend};
use crate::data::value::{sections_from_document, SectionMap};
use crate::data::{DataError, Result};
use crate::utils::file_helpers::{ensure_parent_dir, read_optional, set_private_permissions};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// YAML 文件后端
#[derive(Debug, Clone)]
pub struct YamlBackend {
    path: PathBuf,
}

impl YamlBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 排他写锁，drop 时释放
struct WriteLock<'a> {
    file: &'a File,
    path: &'a Path,
}

impl<'a> WriteLock<'a> {
    fn acquire(file: &'a File, path: &'a Path) -> Result<Self> {
        file.lock_exclusive().map_err(|e| DataError::io(path, e))?;
        tracing::trace!(path = ?path, "已获取 YAML 写锁");
        Ok(Self { file, path })
    }
}

impl Drop for WriteLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            tracing::warn!(path = ?self.path, error = %e, "释放 YAML 写锁失败");
        }
    }
}

impl StorageBackend for YamlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Yaml
    }

    fn load(&self) -> Result<SectionMap> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(SectionMap::new());
        };
        if content.trim().is_empty() {
            return Ok(SectionMap::new());
        }

        let document: serde_json::Value = serde_yaml::from_str(&content)?;
        let data = sections_from_document(document)?;
        tracing::debug!(path = ?self.path, sections = data.len(), "已加载 YAML 数据");
        Ok(data)
    }

    fn persist(&self, data: &SectionMap) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        let content = serde_yaml::to_string(data)?;

        // 先打开不截断，拿到锁之后再截断
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| DataError::io(&self.path, e))?;

        {
            let _lock = WriteLock::acquire(&file, &self.path)?;
            file.set_len(0).map_err(|e| DataError::io(&self.path, e))?;
            (&file)
                .write_all(content.as_bytes())
                .map_err(|e| DataError::io(&self.path, e))?;
            (&file).flush().map_err(|e| DataError::io(&self.path, e))?;
            file.sync_all().map_err(|e| DataError::io(&self.path, e))?;
        }

        set_private_permissions(&self.path)?;
        tracing::debug!(path = ?self.path, sections = data.len(), "已写入 YAML 数据");
        Ok(())
    }
}
