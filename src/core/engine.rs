//! 调和引擎 - 本地清单与远端容器之间的差异传输
//!
//! 上传和下载是一对镜像的批次：逐条目比较指纹，只搬运有差异的
//! 内容。单个条目的失败被隔离在该条目内，报告里恰好每条目一个
//! 结果，批次永不中途夭折。

use crate::core::fingerprint::{
    fingerprints_equal, local_fingerprint, remote_fingerprint, FingerprintPolicy,
};
use crate::core::scanner::{FileEntry, Manifest};
use crate::error::SyncError;
use crate::storage::{ByteStream, ObjectInfo, ObjectMeta, Storage};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

/// 未识别扩展名时的兜底内容类型
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 最大并发传输数
    pub max_concurrent_transfers: usize,
    /// 指纹策略
    pub policy: FingerprintPolicy,
    /// 单条目最大重试次数（只作用于传输，不作用于容器管理）
    pub max_retries: u32,
    /// 重试基础延迟（毫秒），指数退避
    pub retry_base_delay_ms: u64,
    /// 流式上传缓冲块大小（字节）
    pub stream_chunk_size: usize,
    /// 流式上传并发缓冲块数
    pub stream_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 4,
            policy: FingerprintPolicy::default(),
            max_retries: 3,
            retry_base_delay_ms: 500,
            stream_chunk_size: crate::storage::STREAM_CHUNK_SIZE,
            stream_concurrency: crate::storage::STREAM_CONCURRENCY,
        }
    }
}

/// 单个条目的处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// 远端原本没有，新写入
    Uploaded,
    /// 本地原本没有，新落盘
    Downloaded,
    /// 两侧都有但指纹不同，已覆盖旧副本
    Refreshed,
    /// 指纹一致，未传输
    Skipped,
    /// 该条目传输失败（重试耗尽），批次继续
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryOutcome {
    pub key: String,
    pub status: EntryStatus,
}

/// 一次批次的汇总报告。并行执行时结果顺序可能与清单不同，
/// 但每个条目恰好出现一次。
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub storage: String,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: u64,
    pub transferred: u32,
    pub refreshed: u32,
    pub skipped: u32,
    pub failed: u32,
    pub outcomes: Vec<EntryOutcome>,
}

impl SyncReport {
    fn assemble(storage: &str, start_time: i64, outcomes: Vec<EntryOutcome>) -> Self {
        let end_time = chrono::Utc::now().timestamp();
        let count = |f: fn(&EntryStatus) -> bool| {
            outcomes.iter().filter(|o| f(&o.status)).count() as u32
        };
        Self {
            storage: storage.to_string(),
            start_time,
            end_time,
            duration: (end_time - start_time).max(0) as u64,
            transferred: count(|s| {
                matches!(s, EntryStatus::Uploaded | EntryStatus::Downloaded)
            }),
            refreshed: count(|s| matches!(s, EntryStatus::Refreshed)),
            skipped: count(|s| matches!(s, EntryStatus::Skipped)),
            failed: count(|s| matches!(s, EntryStatus::Failed(_))),
            outcomes,
        }
    }
}

/// 调和引擎
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self { config }
    }

    /// 上传批次：清单里的每个条目与远端对象比指纹，
    /// 相同跳过，不同或缺失则上传。
    pub async fn upload_all(
        &self,
        manifest: &Manifest,
        storage: Arc<dyn Storage>,
    ) -> SyncReport {
        let start_time = chrono::Utc::now().timestamp();
        info!(
            "开始上传批次: {} 共 {} 个条目",
            storage.name(),
            manifest.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transfers));
        let outcomes = Arc::new(Mutex::new(Vec::with_capacity(manifest.len())));
        let mut handles = Vec::with_capacity(manifest.len());

        for entry in manifest.iter().cloned() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let storage = storage.clone();
            let outcomes = outcomes.clone();
            let config = self.config.clone();

            let join_key = entry.remote_key.clone();
            let handle = tokio::spawn(async move {
                let key = entry.remote_key.clone();
                let status =
                    Self::run_with_retry(&config, &key, || upload_entry(&entry, &*storage, config.policy))
                        .await;
                outcomes.lock().await.push(EntryOutcome { key, status });
                drop(permit);
            });
            handles.push((join_key, handle));
        }

        Self::join_workers(handles, &outcomes).await;

        let outcomes = Arc::try_unwrap(outcomes)
            .expect("all workers finished")
            .into_inner();
        let report = SyncReport::assemble(storage.name(), start_time, outcomes);
        info!(
            "上传批次完成: 新增 {}, 覆盖 {}, 跳过 {}, 失败 {}",
            report.transferred, report.refreshed, report.skipped, report.failed
        );
        report
    }

    /// 下载批次：枚举容器内全部对象，与本地副本比指纹后落盘。
    /// 枚举本身失败属于后端错误，直接上抛；之后的每个对象独立。
    pub async fn download_all(
        &self,
        storage: Arc<dyn Storage>,
        local_root: &str,
    ) -> Result<SyncReport, SyncError> {
        if local_root.trim().is_empty() {
            return Err(SyncError::config("root folder is not inserted"));
        }

        let start_time = chrono::Utc::now().timestamp();
        let objects = storage
            .list_objects(None)
            .await
            .map_err(SyncError::Provider)?;
        info!(
            "开始下载批次: {} 共 {} 个对象 -> {}",
            storage.name(),
            objects.len(),
            local_root
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transfers));
        let outcomes = Arc::new(Mutex::new(Vec::with_capacity(objects.len())));
        let mut handles = Vec::with_capacity(objects.len());

        for object in objects {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let storage = storage.clone();
            let outcomes = outcomes.clone();
            let config = self.config.clone();
            let root = local_root.to_string();

            let join_key = object.path.clone();
            let handle = tokio::spawn(async move {
                let key = object.path.clone();
                let status = Self::run_with_retry(&config, &key, || {
                    download_object(&object, &*storage, &root, config.policy)
                })
                .await;
                outcomes.lock().await.push(EntryOutcome { key, status });
                drop(permit);
            });
            handles.push((join_key, handle));
        }

        Self::join_workers(handles, &outcomes).await;

        let outcomes = Arc::try_unwrap(outcomes)
            .expect("all workers finished")
            .into_inner();
        let report = SyncReport::assemble(storage.name(), start_time, outcomes);
        info!(
            "下载批次完成: 新增 {}, 覆盖 {}, 跳过 {}, 失败 {}",
            report.transferred, report.refreshed, report.skipped, report.failed
        );
        Ok(report)
    }

    /// 流式上传：不落本地盘、不比指纹，总是传输。
    /// 内容类型只从给定的名字字符串推断，推不出来就是配置错误。
    pub async fn upload_stream(
        &self,
        storage: Arc<dyn Storage>,
        stream: ByteStream,
        file_name: &str,
        is_uuid: bool,
        prefix: &str,
    ) -> Result<String, SyncError> {
        let trimmed = file_name.trim();
        if trimmed.len() < 3 {
            return Err(SyncError::config("file name is invalid (shorter than 3 characters)"));
        }

        let content_type = mime_guess::from_path(trimmed)
            .first_raw()
            .ok_or_else(|| {
                SyncError::Config(format!("cannot infer a MIME type from {:?}", trimmed))
            })?;

        // UUID 替换时原始名字被整体丢弃，只留前缀
        let key = if is_uuid {
            format!("{}{}", prefix, uuid::Uuid::new_v4())
        } else {
            format!("{}{}", prefix, trimmed)
        };

        info!("流式上传: {} ({})", key, content_type);
        storage
            .write_stream(
                &key,
                stream,
                content_type,
                self.config.stream_chunk_size,
                self.config.stream_concurrency,
            )
            .await
            .map_err(SyncError::Provider)?;
        Ok(key)
    }

    /// 等待全部条目任务结束。任务异常退出（panic 被 runtime 捕获）
    /// 时它没来得及记录自己的结果，在这里补一条 Failed，
    /// 保证报告里每个条目恰好出现一次。
    async fn join_workers(
        handles: Vec<(String, tokio::task::JoinHandle<()>)>,
        outcomes: &Arc<Mutex<Vec<EntryOutcome>>>,
    ) {
        for (key, handle) in handles {
            if let Err(e) = handle.await {
                error!("条目任务异常退出: {} - {}", key, e);
                outcomes.lock().await.push(EntryOutcome {
                    key,
                    status: EntryStatus::Failed(format!("worker task aborted: {}", e)),
                });
            }
        }
    }

    /// 带指数退避的条目执行；重试耗尽后折叠成 Failed 结果
    async fn run_with_retry<F, Fut>(config: &SyncConfig, key: &str, mut op: F) -> EntryStatus
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<EntryStatus>>,
    {
        let mut last_error = String::new();
        for attempt in 0..=config.max_retries {
            match op().await {
                Ok(status) => return status,
                Err(e) => {
                    last_error = format!("{:#}", e);
                    if attempt < config.max_retries {
                        let delay = config.retry_base_delay_ms * (2_u64.pow(attempt));
                        warn!(
                            "条目失败，{}ms 后重试 ({}/{}): {} - {}",
                            delay,
                            attempt + 1,
                            config.max_retries,
                            key,
                            last_error
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        error!("条目最终失败: {} - {}", key, last_error);
        EntryStatus::Failed(last_error)
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 单条目上传：stat -> 双侧指纹 -> 跳过或传输。
/// 远端指纹缺失一律视为"一定不同"。
async fn upload_entry(
    entry: &FileEntry,
    storage: &dyn Storage,
    policy: FingerprintPolicy,
) -> Result<EntryStatus> {
    let meta = storage.stat(&entry.remote_key).await?;
    let remote_fp = meta.as_ref().and_then(|m| remote_fingerprint(m, policy));
    let local_fp = local_fingerprint(&entry.local_path, policy).await?;

    if fingerprints_equal(local_fp.as_deref(), remote_fp.as_deref()) {
        debug!("Existed: {}", entry.remote_key);
        return Ok(EntryStatus::Skipped);
    }

    let content_type = entry
        .content_type
        .as_deref()
        .unwrap_or(FALLBACK_CONTENT_TYPE);
    info!(method = "automatic", "Uploading: {}", entry.remote_key);
    storage
        .upload_file(&entry.remote_key, &entry.local_path, content_type)
        .await?;

    if meta.is_some() {
        info!("Refreshed: {}", entry.remote_key);
        Ok(EntryStatus::Refreshed)
    } else {
        info!("Uploaded: {}", entry.remote_key);
        Ok(EntryStatus::Uploaded)
    }
}

/// 单对象下载：对象名按 `/` 拆段拼到本地根目录下，
/// 与现存副本（可能没有）比指纹后决定是否落盘。
async fn download_object(
    object: &ObjectInfo,
    storage: &dyn Storage,
    local_root: &str,
    policy: FingerprintPolicy,
) -> Result<EntryStatus> {
    let mut local_path = PathBuf::from(local_root);
    for segment in object.path.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        // 带 .. 段的对象名会被拼到根目录之外，按条目失败处理
        if segment == ".." {
            anyhow::bail!("object name escapes the local root: {}", object.path);
        }
        local_path.push(segment);
    }

    let remote_meta = ObjectMeta {
        size: object.size,
        content_md5: object.content_md5.clone(),
    };
    let remote_fp = remote_fingerprint(&remote_meta, policy);
    let local_fp = local_fingerprint(&local_path, policy).await?;
    let had_local = local_fp.is_some();

    if fingerprints_equal(local_fp.as_deref(), remote_fp.as_deref()) {
        debug!("Existed: {}", local_path.display());
        return Ok(EntryStatus::Skipped);
    }

    info!("Downloading: {}", object.path);
    storage.download_file(&object.path, &local_path).await?;

    if had_local {
        info!("Refreshed: {}", object.path);
        Ok(EntryStatus::Refreshed)
    } else {
        info!("Downloaded: {}", object.path);
        Ok(EntryStatus::Downloaded)
    }
}
