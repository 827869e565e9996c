//! 配置模块 - 连接字符串解析与前置校验

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 从连接字符串解析出的账户凭据
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub account_name: String,
    pub account_key: String,
    /// Blob 服务端点，例如 `https://acct.blob.core.windows.net`
    pub blob_endpoint: String,
}

impl ConnectionInfo {
    /// 解析 `AccountName=...;AccountKey=...;...` 形式的连接字符串。
    ///
    /// 每个键值对只在第一个 `=` 处切分，AccountKey 的 base64
    /// 填充符不会被截断。
    pub fn parse(conn: &str) -> Result<Self, SyncError> {
        if conn.trim().is_empty() {
            return Err(SyncError::config("connection string is not inserted"));
        }

        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint = None;

        for pair in conn.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key.trim() {
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "EndpointSuffix" => suffix = value.to_string(),
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "BlobEndpoint" => endpoint = Some(value.to_string()),
                _ => {}
            }
        }

        let account_name = account_name
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::config("connection string is missing AccountName"))?;
        let account_key = account_key
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::config("connection string is missing AccountKey"))?;

        let blob_endpoint = endpoint
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account_name, suffix));

        Ok(Self {
            account_name,
            account_key,
            blob_endpoint,
        })
    }
}

/// 存储目标 - 真实的 Azure 账户，或用于离线运行/测试的本地目录
#[derive(Debug, Clone)]
pub enum StorageTarget {
    Azblob(ConnectionInfo),
    Local { base_path: String },
}

impl StorageTarget {
    /// `local:<path>` 选择本地后端，其余按 Azure 连接字符串解析
    pub fn parse(conn: &str) -> Result<Self, SyncError> {
        if let Some(path) = conn.strip_prefix("local:") {
            if path.trim().is_empty() {
                return Err(SyncError::config("local target requires a base path"));
            }
            return Ok(StorageTarget::Local {
                base_path: path.to_string(),
            });
        }
        Ok(StorageTarget::Azblob(ConnectionInfo::parse(conn)?))
    }
}

/// 容器的公共访问级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// 匿名可读取 blob
    Blob,
    /// 匿名可读取 blob 并枚举容器
    Container,
    Private,
}

impl AccessLevel {
    /// REST 请求头 `x-ms-blob-public-access` 的取值；private 不发送该头
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            AccessLevel::Blob => Some("blob"),
            AccessLevel::Container => Some("container"),
            AccessLevel::Private => None,
        }
    }
}

impl FromStr for AccessLevel {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(AccessLevel::Blob),
            "container" => Ok(AccessLevel::Container),
            "private" => Ok(AccessLevel::Private),
            other => Err(SyncError::Config(format!(
                "access level must be blob, container or private (got {:?})",
                other
            ))),
        }
    }
}

/// 传输操作的前置条件：容器名与本地目录都必须就位。
/// 这是校验而不是默认值，缺一即 `ConfigError`。
#[derive(Debug, Clone)]
pub struct RootContext {
    pub container_name: String,
    pub folder_path: String,
}

impl RootContext {
    pub fn new(container_name: &str, folder_path: &str) -> Result<Self, SyncError> {
        if container_name.trim().is_empty() {
            return Err(SyncError::config("container name is not inserted"));
        }
        if folder_path.trim().is_empty() {
            return Err(SyncError::config("root folder is not inserted"));
        }
        Ok(Self {
            container_name: container_name.to_string(),
            folder_path: folder_path.to_string(),
        })
    }
}

/// 把 `container/sub/path` 拆成容器名与 blob 前缀
pub fn split_container_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once('/') {
        Some((container, prefix)) if !prefix.is_empty() => (container, Some(prefix)),
        Some((container, _)) => (container, None),
        None => (spec, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_connection_string() {
        let conn = "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5cGFkZGluZw==;EndpointSuffix=core.windows.net";
        let info = ConnectionInfo::parse(conn).unwrap();
        assert_eq!(info.account_name, "acct");
        // base64 填充符必须保留
        assert_eq!(info.account_key, "a2V5cGFkZGluZw==");
        assert_eq!(info.blob_endpoint, "https://acct.blob.core.windows.net");
    }

    #[test]
    fn parse_missing_account_key() {
        let err = ConnectionInfo::parse("AccountName=acct").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn parse_empty_connection_string() {
        assert!(ConnectionInfo::parse("  ").is_err());
    }

    #[test]
    fn parse_local_target() {
        let target = StorageTarget::parse("local:/tmp/store").unwrap();
        assert!(matches!(target, StorageTarget::Local { .. }));
        assert!(StorageTarget::parse("local:").is_err());
    }

    #[test]
    fn access_level_from_str() {
        assert_eq!("blob".parse::<AccessLevel>().unwrap(), AccessLevel::Blob);
        assert_eq!(
            "private".parse::<AccessLevel>().unwrap().header_value(),
            None
        );
        assert!("public".parse::<AccessLevel>().is_err());
    }

    #[test]
    fn root_context_requires_both_fields() {
        assert!(RootContext::new("", "dir").is_err());
        assert!(RootContext::new("cont", " ").is_err());
        assert!(RootContext::new("cont", "dir").is_ok());
    }

    #[test]
    fn container_spec_split() {
        assert_eq!(split_container_spec("photos"), ("photos", None));
        assert_eq!(
            split_container_spec("photos/2024/summer"),
            ("photos", Some("2024/summer"))
        );
        assert_eq!(split_container_spec("photos/"), ("photos", None));
    }
}
