//! 缓存事务
//!
//! 状态机：`Idle → begin → Active → (commit | rollback) → Idle`。
//! 同一时间只能有一个活动事务；`begin` 时保存完整快照，`rollback` 无条件恢复快照
//! （包括快照为空数据集的情况）。

use crate::data::cache::SectionCache;
use crate::data::value::SectionMap;
use crate::data::{DataError, Result};

/// 事务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Active,
}

/// 事务管理器
#[derive(Debug, Default)]
pub struct TransactionManager {
    snapshot: Option<SectionMap>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransactionState {
        if self.snapshot.is_some() {
            TransactionState::Active
        } else {
            TransactionState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// 开始事务，保存缓存快照
    pub fn begin(&mut self, cache: &SectionCache) -> Result<()> {
        if self.is_active() {
            return Err(DataError::logic("已有活动的事务"));
        }
        self.snapshot = Some(cache.snapshot());
        tracing::debug!("事务已开始");
        Ok(())
    }

    /// 当前没有活动事务时返回逻辑错误
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DataError::logic("没有活动的事务"))
        }
    }

    /// 提交成功后丢弃快照
    pub fn finish_commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.snapshot = None;
        tracing::debug!("事务已提交");
        Ok(())
    }

    /// 回滚：用快照替换缓存
    pub fn rollback(&mut self, cache: &mut SectionCache) -> Result<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| DataError::logic("没有活动的事务"))?;
        cache.restore(snapshot);
        tracing::debug!("事务已回滚");
        Ok(())
    }
}
