//! 日志模块 - 控制台日志与可选的文件日志

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    pub level: String,
    /// 文件日志目录，为空时只输出到控制台
    pub log_dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl LogConfig {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 初始化日志系统。返回的 guard 在进程退出前必须存活，
/// 否则文件日志尾部会丢失。
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let level = config.tracing_level();
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap())
        .add_directive("opendal=warn".parse().unwrap());

    // fmt::Layer 的订阅器类型参数随所在的层叠结构而定，
    // 两个分支各自构造，不能共用一个实例
    if let Some(dir) = config.log_dir.as_deref() {
        let appender = tracing_appender::rolling::daily(dir, "blobsync.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(console_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
        Some(guard)
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer);
        let _ = tracing::subscriber::set_global_default(subscriber);
        None
    }
}
