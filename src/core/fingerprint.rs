//! 内容指纹 - 跳过/传输判定的唯一依据
//!
//! 两种可互换的策略：内容 MD5（强，需读整个文件，与远端上报的
//! `Content-MD5` 对齐）和字节长度（弱，同長度改动会漏判，但免去
//! 一次哈希往返）。不比较任何时间戳，从根上避开时钟偏差问题。

use crate::storage::ObjectMeta;
use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use md5::{Digest, Md5};
use std::path::Path;

/// 指纹策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintPolicy {
    /// 内容 MD5 摘要，base64 编码（默认，强校验）
    #[default]
    Checksum,
    /// 字节长度的十进制表示
    Size,
}

/// 计算本地文件的指纹；文件不存在时返回 `None`
pub async fn local_fingerprint(
    path: &Path,
    policy: FingerprintPolicy,
) -> Result<Option<String>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }

    match policy {
        FingerprintPolicy::Checksum => {
            let data = tokio::fs::read(path).await?;
            Ok(Some(md5_base64(&data)))
        }
        FingerprintPolicy::Size => {
            let meta = tokio::fs::metadata(path).await?;
            Ok(Some(meta.len().to_string()))
        }
    }
}

/// 提取远端对象上已记录的指纹。
///
/// 返回 `None` 表示"该类指纹缺失"，必须当作"一定不同"处理，
/// 强制重新传输，绝不能视为相等。
pub fn remote_fingerprint(meta: &ObjectMeta, policy: FingerprintPolicy) -> Option<String> {
    match policy {
        FingerprintPolicy::Checksum => meta.content_md5.clone(),
        FingerprintPolicy::Size => Some(meta.size.to_string()),
    }
}

/// 指纹相等才跳过；任意一侧缺失都判为不同
pub fn fingerprints_equal(local: Option<&str>, remote: Option<&str>) -> bool {
    match (local, remote) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

pub fn md5_base64(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    general_purpose::STANDARD.encode(hasher.finalize())
}
