//! 内存数据集
//!
//! 完整数据集在内存中的镜像，只做纯内存操作，不触碰后端。
//! 构造时从后端加载一次，之后不会再从后端刷新。

use crate::data::backend::StorageBackend;
use crate::data::value::{Section, SectionMap, Value};
use crate::data::Result;

/// 内存数据集
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionCache {
    data: SectionMap,
}

impl SectionCache {
    pub fn new(data: SectionMap) -> Self {
        Self { data }
    }

    /// 从后端加载完整数据集
    pub fn load_from<B: StorageBackend + ?Sized>(backend: &B) -> Result<Self> {
        let data = backend.load()?;
        tracing::debug!(
            backend = %backend.kind(),
            sections = data.len(),
            "缓存已加载"
        );
        Ok(Self::new(data))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.data.get(section).and_then(|entries| entries.get(key))
    }

    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        self.data
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// 删除条目，返回是否真的删除了内容
    ///
    /// section 不存在时不会创建空 section。
    pub fn delete(&mut self, section: &str, key: &str) -> bool {
        self.data
            .get_mut(section)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn remove_section(&mut self, section: &str) -> bool {
        self.data.remove(section).is_some()
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.data.contains_key(section)
    }

    pub fn keys(&self, section: &str) -> Vec<String> {
        self.data
            .get(section)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn sections(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// 完整数据集（用于整体写回）
    pub fn data(&self) -> &SectionMap {
        &self.data
    }

    /// 复制当前数据集
    pub fn snapshot(&self) -> SectionMap {
        self.data.clone()
    }

    pub fn section(&self, section: &str) -> Option<&Section> {
        self.data.get(section)
    }

    /// 把单个 section 恢复为给定内容，`None` 表示该 section 不存在
    pub fn restore_section(&mut self, section: &str, entries: Option<Section>) {
        match entries {
            Some(entries) => {
                self.data.insert(section.to_string(), entries);
            }
            None => {
                self.data.remove(section);
            }
        }
    }

    /// 用快照整体替换当前数据集
    pub fn restore(&mut self, snapshot: SectionMap) {
        self.data = snapshot;
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
