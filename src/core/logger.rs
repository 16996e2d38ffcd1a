//! 日志初始化
//!
//! 存储层只通过 `tracing` 宏产生事件，是否输出、输出到哪里由宿主程序决定。
//! 宿主没有自己的订阅器时可以调用 [`init_logger`] 安装一个：
//! - 级别过滤：`sectiondb=<level>`，设置了 `RUST_LOG` 时以环境变量为准
//! - 输出格式：纯文本或 JSON
//! - 输出目标：控制台、按天滚动的日志文件，或两者同时
//!
//! 级别可以通过 [`update_log_level`] 热更新，格式和输出目标在初始化后固定。

use crate::models::config::{LogConfig, LogFormat, LogLevel, LogOutput};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    registry::LookupSpan,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "sectiondb";

static LOG_LEVEL_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// 文件写入线程的 guard，进程存活期间保持
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// 初始化全局日志订阅器
///
/// 重复初始化（包括宿主已经安装了全局订阅器）返回错误。
pub fn init_logger(config: &LogConfig) -> anyhow::Result<()> {
    let (filter_layer, reload_handle) = reload::Layer::new(create_env_filter(config.level));

    let console_layer = match config.output {
        LogOutput::Console | LogOutput::Both => Some(console_layer(config.format)),
        LogOutput::File => None,
    };
    let (file_layer, guard) = match config.output {
        LogOutput::File | LogOutput::Both => {
            let (layer, guard) = file_layer(config.format, config.file_path.as_deref())?;
            (Some(layer), Some(guard))
        }
        LogOutput::Console => (None, None),
    };

    Registry::default()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("日志系统已初始化，不能重复初始化: {}", e))?;

    // try_init 成功说明这是第一次安装
    let _ = LOG_LEVEL_HANDLE.set(reload_handle);
    if let (Some(guard), Ok(mut slot)) = (guard, FILE_GUARD.lock()) {
        *slot = Some(guard);
    }

    tracing::info!(
        level = config.level.as_str(),
        format = ?config.format,
        output = ?config.output,
        file_path = ?config.file_path,
        "日志系统初始化完成"
    );
    Ok(())
}

/// 热更新日志级别
pub fn update_log_level(level: LogLevel) -> anyhow::Result<()> {
    let handle = LOG_LEVEL_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("日志系统未初始化"))?;

    handle
        .reload(create_env_filter(level))
        .map_err(|e| anyhow::anyhow!("重载日志级别失败: {}", e))?;

    tracing::info!(level = level.as_str(), "日志级别已更新");
    Ok(())
}

fn create_env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", LOG_FILE_PREFIX, level.as_str())))
}

fn console_layer<S>(format: LogFormat) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(cfg!(debug_assertions));
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn file_layer<S>(
    format: LogFormat,
    file_path: Option<&str>,
) -> anyhow::Result<(BoxedLayer<S>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let log_dir = resolve_log_dir(file_path)?;
    let (writer, guard) = non_blocking(rolling::daily(log_dir, LOG_FILE_PREFIX));

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let layer = match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().with_thread_ids(true).boxed(),
    };
    Ok((layer, guard))
}

/// 日志目录：配置指定的路径，或数据目录下的 `sectiondb/logs`
fn resolve_log_dir(file_path: Option<&str>) -> anyhow::Result<PathBuf> {
    let dir = match file_path {
        Some(path) => PathBuf::from(path),
        None => dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("无法获取数据目录"))?
            .join(LOG_FILE_PREFIX)
            .join("logs"),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
