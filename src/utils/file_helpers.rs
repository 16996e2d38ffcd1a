//! 文件操作辅助函数
//!
//! 文件类后端（JSON / YAML）共用的读写工具：可选读取、创建父目录、设置文件权限。

use crate::data::{DataError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// 读取文件内容；文件不存在时返回 `None`
///
/// 首次运行（尚未持久化）不是错误。
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DataError::io(path, e)),
    }
}

/// 确保文件的父目录存在
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
    }
    Ok(())
}

/// 设置文件权限（Unix 平台 0o600）
#[cfg(unix)]
pub fn set_private_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = fs::metadata(path).map_err(|e| DataError::io(path, e))?;
    let mut perms = metadata.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms).map_err(|e| DataError::io(path, e))
}

#[cfg(not(unix))]
pub fn set_private_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_optional_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.json");
        assert!(read_optional(&path).unwrap().is_none());
    }

    #[test]
    fn test_read_optional_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        fs::write(&path, "{}").unwrap();
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_read_optional_directory_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_optional(temp_dir.path()).unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }

    #[test]
    fn test_ensure_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("data.yml");
        ensure_parent_dir(&path).unwrap();
        assert!(temp_dir.path().join("a").join("b").is_dir());

        // 相对路径且无父目录
        ensure_parent_dir(Path::new("data.yml")).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_set_private_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        fs::write(&path, "{}").unwrap();
        set_private_permissions(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
