//! 缓存层实现
//!
//! - `section_cache`: 完整数据集的内存镜像
//! - `cached_store`: 包装后端的写穿透缓存（整体快照写回 + 事务推迟写回）

pub mod cached_store;
pub mod section_cache;

pub use cached_store::CachedStore;
pub use section_cache::SectionCache;
