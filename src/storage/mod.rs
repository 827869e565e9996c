pub mod azblob;
pub mod local;
pub mod sas;

use crate::config::{AccessLevel, StorageTarget};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

pub use azblob::AzblobProvider;
pub use local::LocalProvider;
pub use sas::SignedUrl;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- 整文件读写
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 流式上传的默认缓冲参数（1MiB × 20）
pub const STREAM_CHUNK_SIZE: usize = 1024 * 1024;
pub const STREAM_CONCURRENCY: usize = 20;

/// 枚举容器内对象时拿到的一条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// 容器内的对象名，正斜杠分隔，无前导斜杠
    pub path: String,
    pub size: u64,
    /// 提供方上报的内容 MD5（base64）；没有就是 None
    pub content_md5: Option<String>,
}

/// 单个对象的元数据（stat 结果）
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_md5: Option<String>,
}

/// 容器清单中的一条记录
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub name: String,
    /// 公共访问级别；None 表示 private
    pub public_access: Option<String>,
}

/// 流式上传的输入字节流
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// 单个容器上的对象操作抽象。
/// 一次传输批次内所有条目共享同一个只读句柄。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 递归列出容器内对象（一次性枚举，不可中途重启）
    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>>;

    /// 获取单个对象的元数据；对象不存在返回 Ok(None)，不算错误
    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// 把本地文件写入/覆盖远端对象，带内容类型
    async fn upload_file(&self, key: &str, local_path: &Path, content_type: &str) -> Result<()>;

    /// 把远端对象落到本地文件
    async fn download_file(&self, key: &str, local_path: &Path) -> Result<()>;

    /// 删除对象；删除不存在的对象不报错
    async fn delete(&self, key: &str) -> Result<()>;

    /// 分块缓冲的流式写入，不落本地盘
    async fn write_stream(
        &self,
        key: &str,
        stream: ByteStream,
        content_type: &str,
        chunk_size: usize,
        concurrency: usize,
    ) -> Result<()>;

    /// 存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 容器级管理操作 + 句柄工厂。
/// 这些单目标操作快速失败，不自动重试。
#[async_trait]
pub trait Provider: Send + Sync {
    async fn create_container(&self, name: &str, access: AccessLevel) -> Result<()>;

    async fn remove_container(&self, name: &str) -> Result<()>;

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// 获取某个容器的对象操作句柄
    async fn container(&self, name: &str) -> Result<Arc<dyn Storage>>;

    /// 为单个 blob 签发限时 SAS 地址
    fn signed_url(
        &self,
        container: &str,
        blob: &str,
        permissions: &str,
        expiry_hours: i64,
    ) -> Result<SignedUrl>;
}

/// 同目录下的一次性临时路径。整个文件名后追加 `.{uuid}.tmp`，
/// 不能用 `with_extension`：它会顶掉原扩展名，`x.txt` 和 `x.tmp`
/// 会撞到同一个临时路径上，覆盖掉真实对象。
pub(crate) fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

/// 根据目标配置创建后端实例
pub fn create_provider(target: &StorageTarget) -> Result<Arc<dyn Provider>> {
    match target {
        StorageTarget::Azblob(info) => {
            tracing::info!("初始化 Azure Blob 后端: {}", info.blob_endpoint);
            Ok(Arc::new(AzblobProvider::new(info.clone())?) as Arc<dyn Provider>)
        }
        StorageTarget::Local { base_path } => {
            tracing::info!("初始化本地后端: {}", base_path);
            Ok(Arc::new(LocalProvider::new(base_path)?) as Arc<dyn Provider>)
        }
    }
}
