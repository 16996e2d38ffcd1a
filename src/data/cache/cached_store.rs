//! 写穿透缓存层
//!
//! 包装一个后端：
//! - 读操作（get / has_section / list）只访问内存
//! - 写操作（set / delete / remove_section）先修改内存，再把**整个**缓存写回后端；写回失败时撤销内存修改
//! - 事务活动期间写回推迟到提交
//!
//! 读 O(1)、写 O(数据集大小)，适合读多写少的配置存储。

use crate::data::backend::{Backend, StorageBackend};
use crate::data::cache::SectionCache;
use crate::data::transaction::TransactionManager;
use crate::data::value::Value;
use crate::data::Result;

/// 带内存缓存的存储
pub struct CachedStore {
    backend: Backend,
    cache: SectionCache,
    transaction: TransactionManager,
}

impl CachedStore {
    /// 从后端加载一次完整数据集
    pub fn load(backend: Backend) -> Result<Self> {
        let cache = SectionCache::load_from(&backend)?;
        Ok(Self {
            backend,
            cache,
            transaction: TransactionManager::new(),
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn cache(&self) -> &SectionCache {
        &self.cache
    }

    pub fn get(&self, section: &str, key: &str) -> Option<Value> {
        self.cache.get(section, key).cloned()
    }

    pub fn set(&mut self, section: &str, key: &str, value: Value) -> Result<()> {
        self.mutate(section, |cache| cache.set(section, key, value))
    }

    pub fn delete(&mut self, section: &str, key: &str) -> Result<()> {
        self.mutate(section, |cache| {
            cache.delete(section, key);
        })
    }

    pub fn remove_section(&mut self, section: &str) -> Result<()> {
        self.mutate(section, |cache| {
            cache.remove_section(section);
        })
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.cache.has_section(section)
    }

    pub fn list_keys(&self, section: &str) -> Vec<String> {
        self.cache.keys(section)
    }

    pub fn list_sections(&self) -> Vec<String> {
        self.cache.sections()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    pub fn start_transaction(&mut self) -> Result<()> {
        self.transaction.begin(&self.cache)
    }

    /// 提交：写回当前缓存并结束事务
    ///
    /// 写回失败时事务保持活动状态，调用方可以重试提交或回滚。
    pub fn commit_transaction(&mut self) -> Result<()> {
        self.transaction.ensure_active()?;
        self.backend.persist(self.cache.data())?;
        self.transaction.finish_commit()
    }

    /// 回滚：恢复快照，不访问后端
    pub fn rollback_transaction(&mut self) -> Result<()> {
        self.transaction.rollback(&mut self.cache)
    }

    /// 修改单个 section 后写回；写回失败时把该 section 恢复原状
    fn mutate(&mut self, section: &str, change: impl FnOnce(&mut SectionCache)) -> Result<()> {
        if self.transaction.is_active() {
            change(&mut self.cache);
            return Ok(());
        }

        let previous = self.cache.section(section).cloned();
        change(&mut self.cache);
        if let Err(e) = self.backend.persist(self.cache.data()) {
            self.cache.restore_section(section, previous);
            tracing::warn!(section, error = %e, "写回失败，已撤销缓存修改");
            return Err(e);
        }
        Ok(())
    }
}
