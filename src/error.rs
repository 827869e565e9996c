//! 错误分类 - 配置/扫描/后端三类致命错误
//!
//! 单个文件的传输失败不走这里：它们被隔离在批次内部，
//! 以 `EntryStatus::Failed` 的形式出现在同步报告中。

use thiserror::Error;

/// 同步工具的致命错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 配置缺失或非法（连接字符串、容器名、目录、SAS 权限等），
    /// 在任何 I/O 之前抛出
    #[error("configuration error: {0}")]
    Config(String),

    /// 本地目录遍历失败（权限等），扫描不允许静默地部分完成
    #[error("scan failed: {0}")]
    Scan(anyhow::Error),

    /// 存储后端的容器级操作失败（创建/删除/枚举），不自动重试
    #[error("provider operation failed: {0}")]
    Provider(anyhow::Error),
}

impl SyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        SyncError::Config(msg.into())
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
