//! 宿主配置对象适配器
//!
//! 部署在宿主程序内时，可以把存储完全委托给宿主提供的配置对象。
//! 宿主对象只按 section 存取整块映射，不了解单个 key：
//! 读写单个条目需要读出整个 section 映射、修改后整体写回。
//!
//! 与其他后端不同，读取不存在的 section 下的条目返回逻辑错误而不是 `None`。
//!
//! 这是独立的适配器，不实现 [`StorageBackend`](crate::data::StorageBackend)，也不经过
//! [`Database`](crate::data::Database)：宿主对象无法枚举 section，也没有整体加载与覆盖的语义，
//! 缓存和事务由宿主自己负责。它提供与后端契约对应的 section 粒度操作
//! （get / set / delete / has_section / remove_section / list_keys）。

use crate::data::value::{Section, Value};
use crate::data::{DataError, Result};

/// 宿主配置对象需要提供的接口
pub trait HostConfig {
    /// 读取 section，不存在时返回 `default`
    fn get(&self, section: &str, default: Value) -> Value;

    fn set(&mut self, section: &str, value: Value);

    fn exists(&self, section: &str) -> bool;

    fn remove(&mut self, section: &str);

    /// 把修改保存到宿主的存储介质
    fn save(&mut self) -> Result<()>;
}

/// 以 section 为粒度包装宿主配置对象
pub struct HostConfigStore<H: HostConfig> {
    host: H,
}

impl<H: HostConfig> HostConfigStore<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn into_inner(self) -> H {
        self.host
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.host.exists(section)
    }

    /// 读取整个 section；不存在时为逻辑错误
    pub fn get_section(&self, section: &str) -> Result<Section> {
        if !self.host.exists(section) {
            return Err(DataError::logic(format!("section '{}' 不存在", section)));
        }
        match self.host.get(section, Value::Null) {
            Value::Map(entries) => Ok(entries),
            Value::Null => Ok(Section::new()),
            _ => Err(DataError::Parse(format!(
                "宿主配置中的 section '{}' 不是映射",
                section
            ))),
        }
    }

    /// 整体写入 section 并保存
    pub fn set_section(&mut self, section: &str, entries: Section) -> Result<()> {
        self.host.set(section, Value::Map(entries));
        self.host.save()
    }

    pub fn remove_section(&mut self, section: &str) -> Result<()> {
        self.host.remove(section);
        self.host.save()
    }

    /// 读取条目；section 不存在为逻辑错误，key 不存在返回 `None`
    pub fn get(&self, section: &str, key: &str) -> Result<Option<Value>> {
        let mut entries = self.get_section(section)?;
        Ok(entries.remove(key))
    }

    /// 写入条目（读出整个 section，修改后整体写回）
    pub fn set(&mut self, section: &str, key: &str, value: Value) -> Result<()> {
        let mut entries = if self.host.exists(section) {
            self.get_section(section)?
        } else {
            Section::new()
        };
        entries.insert(key.to_string(), value);
        self.set_section(section, entries)
    }

    /// 删除条目；section 不存在为逻辑错误
    pub fn delete(&mut self, section: &str, key: &str) -> Result<()> {
        let mut entries = self.get_section(section)?;
        entries.remove(key);
        self.set_section(section, entries)
    }

    pub fn list_keys(&self, section: &str) -> Result<Vec<String>> {
        Ok(self.get_section(section)?.into_keys().collect())
    }
}
