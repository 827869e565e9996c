use super::{
    ByteStream, ContainerInfo, ObjectInfo, ObjectMeta, Provider, SignedUrl, Storage,
};
use crate::config::AccessLevel;
use crate::core::fingerprint::md5_base64;
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

/// 本地文件系统后端：基础目录下的每个子目录就是一个"容器"。
/// 用于离线运行和测试，接口语义与远端后端保持一致。
pub struct LocalProvider {
    base_path: PathBuf,
}

impl LocalProvider {
    pub fn new(path: &str) -> Result<Self> {
        let base_path = PathBuf::from(path);
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        Ok(Self { base_path })
    }
}

#[async_trait]
impl Provider for LocalProvider {
    async fn create_container(&self, name: &str, access: AccessLevel) -> Result<()> {
        // 本地后端没有公共访问的概念，只建目录
        tracing::debug!("本地容器忽略访问级别 {:?}", access);
        fs::create_dir_all(self.base_path.join(name)).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        fs::remove_dir_all(self.base_path.join(name)).await?;
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let mut containers = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                containers.push(ContainerInfo {
                    name: entry.file_name().to_string_lossy().to_string(),
                    public_access: None,
                });
            }
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn container(&self, name: &str) -> Result<Arc<dyn Storage>> {
        let root = self.base_path.join(name);
        fs::create_dir_all(&root).await?;
        let label = format!("local:{}", root.display());
        Ok(Arc::new(LocalStorage { root, name: label }) as Arc<dyn Storage>)
    }

    fn signed_url(
        &self,
        _container: &str,
        _blob: &str,
        _permissions: &str,
        _expiry_hours: i64,
    ) -> Result<SignedUrl> {
        anyhow::bail!("SAS is not supported by the local backend")
    }
}

/// 单个本地"容器"上的对象操作
pub struct LocalStorage {
    root: PathBuf,
    name: String,
}

impl LocalStorage {
    fn resolve_path(&self, key: &str) -> PathBuf {
        let key = key.trim_start_matches('/').trim_start_matches('\\');
        if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(key)
        }
    }

    /// 临时文件写入后原子重命名
    async fn write_atomic(path: &Path, data: Vec<u8>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = super::temp_sibling(path);
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let root = self.root.clone();
        let prefix = prefix.map(str::to_string);
        // 列举时顺带算 MD5，让本地后端也能走校验和策略；
        // 放进 spawn_blocking，别堵 async runtime
        let objects: Vec<ObjectInfo> = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|entry| {
                    let relative = entry.path().strip_prefix(&root).ok()?;
                    let key = relative.to_string_lossy().replace('\\', "/");
                    if let Some(p) = prefix.as_deref() {
                        if !key.starts_with(p) {
                            return None;
                        }
                    }
                    let data = std::fs::read(entry.path()).ok()?;
                    Some(ObjectInfo {
                        path: key,
                        size: data.len() as u64,
                        content_md5: Some(md5_base64(&data)),
                    })
                })
                .collect()
        })
        .await?;

        Ok(objects)
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let full_path = self.resolve_path(key);
        match fs::read(&full_path).await {
            Ok(data) => Ok(Some(ObjectMeta {
                size: data.len() as u64,
                content_md5: Some(md5_base64(&data)),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload_file(&self, key: &str, local_path: &Path, _content_type: &str) -> Result<()> {
        let data = fs::read(local_path).await?;
        Self::write_atomic(&self.resolve_path(key), data).await
    }

    async fn download_file(&self, key: &str, local_path: &Path) -> Result<()> {
        let data = fs::read(self.resolve_path(key)).await?;
        Self::write_atomic(local_path, data).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.resolve_path(key);
        if !full_path.exists() {
            return Ok(());
        }
        fs::remove_file(&full_path).await?;
        Ok(())
    }

    async fn write_stream(
        &self,
        key: &str,
        mut stream: ByteStream,
        _content_type: &str,
        _chunk_size: usize,
        _concurrency: usize,
    ) -> Result<()> {
        let full_path = self.resolve_path(key);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = super::temp_sibling(&full_path);
        let mut file = fs::File::create(&temp_path).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        fs::rename(&temp_path, &full_path).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
