//! 命令行定义

use clap::{Parser, Subcommand};

/// Azure Blob 存储同步工具
#[derive(Debug, Parser)]
#[command(name = "blobsync", version, about = "Folder to blob container synchronization")]
pub struct Cli {
    /// 存储目标：Azure 连接字符串，或 local:<目录> 使用本地后端
    #[arg(
        long,
        global = true,
        env = "AZURE_STORAGE_CONNECTION_STRING",
        hide_env_values = true
    )]
    pub connection_string: Option<String>,

    /// 日志级别: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// 文件日志目录（默认不写文件）
    #[arg(long, global = true)]
    pub log_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 创建容器
    Create {
        /// 容器名
        container: String,
        /// 公开访问级别: blob, container, private
        #[arg(long, default_value = "blob")]
        access: String,
    },
    /// 删除容器
    Remove {
        /// 容器名
        container: String,
    },
    /// 列出账户下的容器；给定 `container[/prefix]` 时列出其中的对象
    List {
        /// 容器名，可带 `/` 前缀过滤，例如 photos/2024
        container: Option<String>,
    },
    /// 上传文件夹到容器
    Upload {
        /// 容器名
        container: String,
        /// 本地根目录
        folder: String,
        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// 下载容器到文件夹
    Download {
        /// 容器名
        container: String,
        /// 本地根目录
        folder: String,
        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// 删除容器内匹配前缀的对象
    Delete {
        /// `container/path` 形式，path 作为对象名前缀匹配
        spec: String,
    },
    /// 为单个对象生成 SAS 访问链接
    Sas {
        /// 容器名
        container: String,
        /// 对象名
        blob: String,
        /// 权限集合（racwdl 的子集）
        #[arg(long, default_value = "racwd")]
        permissions: String,
        /// 链接有效期（小时）
        #[arg(long, default_value_t = 12)]
        expiry: i64,
    },
    /// 从标准输入流式上传单个对象
    Put {
        /// 容器名
        container: String,
        /// 对象名（用于推断内容类型，至少 3 个字符）
        name: String,
        /// 用随机 UUID 替换对象名
        #[arg(long)]
        uuid: bool,
        /// 对象名前缀，例如 images/
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

/// 传输批次共用的参数
#[derive(Debug, clap::Args)]
pub struct TransferArgs {
    /// 最大并发传输数
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// 只按大小比较，不比校验和
    #[arg(long)]
    pub size_only: bool,

    /// 单条目最大重试次数
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// 以 JSON 输出同步报告
    #[arg(long)]
    pub json: bool,
}
