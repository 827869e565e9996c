use super::{
    sas, ByteStream, ContainerInfo, ObjectInfo, ObjectMeta, Provider, SignedUrl, Storage,
    IO_TIMEOUT_SECS, OP_TIMEOUT_SECS,
};
use crate::config::{AccessLevel, ConnectionInfo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Azure Blob 后端。
///
/// 对象读写走 opendal 的 azblob 服务；容器级管理（创建/删除/枚举）
/// opendal 不覆盖，用 reqwest 直连 REST 接口，授权靠内部签发的
/// 账户 SAS。
pub struct AzblobProvider {
    info: ConnectionInfo,
    http: reqwest::Client,
}

impl AzblobProvider {
    pub fn new(info: ConnectionInfo) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(OP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { info, http })
    }

    fn admin_url(&self, path: &str, query: &str) -> Result<String> {
        let auth = sas::account_sas_query(&self.info.account_name, &self.info.account_key)?;
        Ok(format!(
            "{}/{}?{}&{}",
            self.info.blob_endpoint, path, query, auth
        ))
    }

    async fn expect_status(
        response: reqwest::Response,
        expected: reqwest::StatusCode,
        what: &str,
    ) -> Result<reqwest::Response> {
        if response.status() != expected {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} failed: HTTP {} {}", what, status, body.trim());
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for AzblobProvider {
    async fn create_container(&self, name: &str, access: AccessLevel) -> Result<()> {
        let url = self.admin_url(name, "restype=container")?;
        let mut request = self
            .http
            .put(url)
            .header("x-ms-version", "2018-11-09")
            .header("Content-Length", "0");
        if let Some(level) = access.header_value() {
            request = request.header("x-ms-blob-public-access", level);
        }

        let response = request.send().await.context("create container request")?;
        Self::expect_status(response, reqwest::StatusCode::CREATED, "create container").await?;
        tracing::info!("容器已创建: {} ({:?})", name, access);
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let url = self.admin_url(name, "restype=container")?;
        let response = self
            .http
            .delete(url)
            .header("x-ms-version", "2018-11-09")
            .send()
            .await
            .context("remove container request")?;
        Self::expect_status(response, reqwest::StatusCode::ACCEPTED, "remove container").await?;
        tracing::info!("容器已删除: {}", name);
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let url = self.admin_url("", "comp=list")?;
        let response = self
            .http
            .get(url)
            .header("x-ms-version", "2018-11-09")
            .send()
            .await
            .context("list containers request")?;
        let response =
            Self::expect_status(response, reqwest::StatusCode::OK, "list containers").await?;
        let body = response.text().await?;
        parse_container_listing(&body)
    }

    async fn container(&self, name: &str) -> Result<Arc<dyn Storage>> {
        use opendal::services::Azblob;

        let builder = Azblob::default()
            .container(name)
            .endpoint(&self.info.blob_endpoint)
            .account_name(&self.info.account_name)
            .account_key(&self.info.account_key);

        // 超时层兜底，单文件失败不至于挂死整个批次
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let label = format!("azblob://{}/{}", self.info.account_name, name);
        Ok(Arc::new(AzblobStorage {
            operator,
            name: label,
        }) as Arc<dyn Storage>)
    }

    fn signed_url(
        &self,
        container: &str,
        blob: &str,
        permissions: &str,
        expiry_hours: i64,
    ) -> Result<SignedUrl> {
        let query = sas::blob_sas_query(
            &self.info.account_name,
            &self.info.account_key,
            container,
            blob,
            permissions,
            expiry_hours,
        )?;
        let url = format!("{}/{}/{}?{}", self.info.blob_endpoint, container, blob, query);
        Ok(SignedUrl { query, url })
    }
}

/// 从容器清单 XML 里抠出名称和公共访问级别。
/// 响应结构固定且扁平，按 `</Container>` 分段配正则足够。
fn parse_container_listing(xml: &str) -> Result<Vec<ContainerInfo>> {
    let name_re = regex::Regex::new(r"<Name>([^<]+)</Name>").expect("static regex");
    let access_re =
        regex::Regex::new(r"<PublicAccess>([^<]+)</PublicAccess>").expect("static regex");

    let mut containers = Vec::new();
    for chunk in xml.split("</Container>") {
        let Some(name) = name_re.captures(chunk).map(|c| c[1].to_string()) else {
            continue;
        };
        let public_access = access_re.captures(chunk).map(|c| c[1].to_string());
        containers.push(ContainerInfo {
            name,
            public_access,
        });
    }
    Ok(containers)
}

/// 单个容器上的对象操作
pub struct AzblobStorage {
    operator: Operator,
    name: String,
}

#[async_trait]
impl Storage for AzblobStorage {
    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();

        let mut lister = self
            .operator
            .lister_with("")
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::ContentMd5)
            .await?;

        while let Some(entry) = lister.try_next().await? {
            let path_str = entry.path().to_string();

            // 跳过根目录与目录占位符
            if path_str.is_empty() || path_str == "/" {
                continue;
            }
            let meta = entry.metadata();
            if meta.is_dir() {
                continue;
            }

            let key = path_str.trim_start_matches('/').to_string();
            // 前缀按对象名匹配，不按目录层级
            if let Some(p) = prefix {
                if !key.starts_with(p) {
                    continue;
                }
            }

            objects.push(ObjectInfo {
                path: key,
                size: meta.content_length(),
                content_md5: meta.content_md5().map(|s| s.to_string()),
            });
        }

        Ok(objects)
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>> {
        match self.operator.stat(key).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                size: meta.content_length(),
                content_md5: meta.content_md5().map(|s| s.to_string()),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload_file(&self, key: &str, local_path: &Path, content_type: &str) -> Result<()> {
        let data = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("read {}", local_path.display()))?;
        self.operator
            .write_with(key, data)
            .content_type(content_type)
            .await?;
        Ok(())
    }

    async fn download_file(&self, key: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = self.operator.read(key).await?.to_vec();

        // 临时文件写入后原子重命名，半截文件不会被当成完整副本
        let temp_path = super::temp_sibling(local_path);
        tokio::fs::write(&temp_path, data).await?;
        tokio::fs::rename(&temp_path, local_path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // 删除不存在的对象不报错
        self.operator.delete(key).await?;
        Ok(())
    }

    async fn write_stream(
        &self,
        key: &str,
        mut stream: ByteStream,
        content_type: &str,
        chunk_size: usize,
        concurrency: usize,
    ) -> Result<()> {
        let mut writer = self
            .operator
            .writer_with(key)
            .content_type(content_type)
            .chunk(chunk_size)
            .concurrent(concurrency)
            .await?;

        while let Some(chunk) = stream.next().await {
            writer.write(chunk?).await?;
        }
        writer.close().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_listing_is_parsed() {
        let xml = r#"<?xml version="1.0"?><EnumerationResults>
          <Containers>
            <Container><Name>public-site</Name><Properties><PublicAccess>blob</PublicAccess></Properties></Container>
            <Container><Name>backups</Name><Properties><Etag>x</Etag></Properties></Container>
          </Containers>
        </EnumerationResults>"#;

        let list = parse_container_listing(xml).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "public-site");
        assert_eq!(list[0].public_access.as_deref(), Some("blob"));
        assert_eq!(list[1].name, "backups");
        assert!(list[1].public_access.is_none());
    }

    #[test]
    fn empty_listing_yields_no_containers() {
        let xml = "<EnumerationResults><Containers></Containers></EnumerationResults>";
        assert!(parse_container_listing(xml).unwrap().is_empty());
    }
}
