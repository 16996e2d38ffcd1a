//! 基础设施：日志初始化

pub mod logger;

pub use logger::{init_logger, update_log_level};
