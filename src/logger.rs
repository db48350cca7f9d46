//! 日志初始化
//!
//! 控制台输出 + 可选的日志文件（追加在运行日志头之后）。
//! 默认级别 info，可用 `RUST_LOG` 覆盖；`verbose` 时本 crate 输出 debug。

use std::fs::{File, OpenOptions};
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "info,contact_profiler=debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn open_log_file(path: &str) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("日志文件 {} 无法打开，只输出到控制台: {}", path, e))
}

/// 初始化全局日志；重复调用时保持第一次的设置
pub fn init(verbose: bool, log_file: Option<&str>) {
    let opened = log_file.map(open_log_file);
    let (file, open_error) = match opened {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(message)) => (None, Some(message)),
        None => (None, None),
    };
    let file_layer = file.map(|file| fmt::layer().with_ansi(false).with_target(false).with_writer(Mutex::new(file)));

    let _ = tracing_subscriber::registry()
        .with(filter(verbose))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();

    if let Some(message) = open_error {
        warn!("⚠️ {}", message);
    }
}
