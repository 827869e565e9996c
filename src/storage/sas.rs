//! SAS 签名 - 不借助厂商 SDK，直接按共享密钥算法签发
//!
//! 服务 SAS 用于对外分发单个 blob 的限时地址；账户 SAS 仅供内部
//! 的容器管理 REST 调用使用。

use crate::error::SyncError;
use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

/// 签名协议版本
const SAS_VERSION: &str = "2018-11-09";
/// SAS 允许的权限标志，亦即规范排序
const PERMISSION_ORDER: &str = "racwdl";
/// 默认过期小时数
pub const DEFAULT_EXPIRY_HOURS: i64 = 12;

/// 签发结果：查询串 + 完整地址
#[derive(Debug, Clone, Serialize)]
pub struct SignedUrl {
    pub query: String,
    pub url: String,
}

/// 校验权限串并按规范顺序重排（Azure 要求固定顺序）
pub fn normalize_permissions(permissions: &str) -> Result<String, SyncError> {
    if permissions.is_empty() {
        return Err(SyncError::config("SAS permission string is empty"));
    }
    for c in permissions.chars() {
        if !PERMISSION_ORDER.contains(c) {
            return Err(SyncError::Config(format!(
                "invalid SAS permission {:?}, allowed set is {:?}",
                c, PERMISSION_ORDER
            )));
        }
    }
    Ok(PERMISSION_ORDER
        .chars()
        .filter(|c| permissions.contains(*c))
        .collect())
}

/// 为单个 blob 签发服务 SAS 查询串。
///
/// 有效窗口是 `[now - expiry_hours, now + expiry_hours]`：起始时间
/// 向过去偏移与过期相同的幅度，总窗口是名义时长的两倍。
pub fn blob_sas_query(
    account_name: &str,
    account_key: &str,
    container: &str,
    blob: &str,
    permissions: &str,
    expiry_hours: i64,
) -> Result<String> {
    if expiry_hours <= 0 {
        return Err(SyncError::config("SAS expiry must be a positive hour count").into());
    }
    let sp = normalize_permissions(permissions)?;

    let now = Utc::now();
    let st = (now - Duration::hours(expiry_hours)).format("%Y-%m-%dT%H:%M:%SZ");
    let se = (now + Duration::hours(expiry_hours)).format("%Y-%m-%dT%H:%M:%SZ");
    let (st, se) = (st.to_string(), se.to_string());

    let canonical = format!("/blob/{}/{}/{}", account_name, container, blob);
    let protocol = "https,http";

    // 2018-11-09 版本的待签名串，空字段也要占位
    let string_to_sign = format!(
        "{sp}\n{st}\n{se}\n{canonical}\n\n\n{protocol}\n{version}\nb\n\n\n\n\n\n",
        sp = sp,
        st = st,
        se = se,
        canonical = canonical,
        protocol = protocol,
        version = SAS_VERSION,
    );
    let sig = sign(account_key, &string_to_sign)?;

    Ok(format!(
        "sv={}&st={}&se={}&sr=b&sp={}&spr={}&sig={}",
        SAS_VERSION,
        urlencoding::encode(&st),
        urlencoding::encode(&se),
        sp,
        urlencoding::encode(protocol),
        urlencoding::encode(&sig),
    ))
}

/// 内部使用的账户 SAS（容器管理 REST 调用的授权）。
/// 起始时间回拨 5 分钟吸收时钟偏差，有效 1 小时。
pub(crate) fn account_sas_query(account_name: &str, account_key: &str) -> Result<String> {
    let now = Utc::now();
    let st = (now - Duration::minutes(5))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();
    let se = (now + Duration::hours(1))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();

    let (sp, ss, srt, protocol) = ("rwdlac", "b", "sco", "https");
    let string_to_sign = format!(
        "{account}\n{sp}\n{ss}\n{srt}\n{st}\n{se}\n\n{protocol}\n{version}\n",
        account = account_name,
        sp = sp,
        ss = ss,
        srt = srt,
        st = st,
        se = se,
        protocol = protocol,
        version = SAS_VERSION,
    );
    let sig = sign(account_key, &string_to_sign)?;

    Ok(format!(
        "sv={}&ss={}&srt={}&sp={}&st={}&se={}&spr={}&sig={}",
        SAS_VERSION,
        ss,
        srt,
        sp,
        urlencoding::encode(&st),
        urlencoding::encode(&se),
        protocol,
        urlencoding::encode(&sig),
    ))
}

/// HMAC-SHA256(base64 解码的账户密钥, 待签名串) 再 base64
fn sign(account_key: &str, string_to_sign: &str) -> Result<String> {
    let key = general_purpose::STANDARD
        .decode(account_key)
        .map_err(|e| anyhow::anyhow!("account key is not valid base64: {}", e))?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| anyhow::anyhow!("invalid HMAC key: {}", e))?;
    mac.update(string_to_sign.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    const TEST_KEY: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM="; // "secret-key-for-tests"

    #[test]
    fn permissions_are_validated_and_reordered() {
        assert_eq!(normalize_permissions("dwcar").unwrap(), "racwd");
        assert_eq!(normalize_permissions("l").unwrap(), "l");
        assert!(normalize_permissions("").is_err());
        assert!(normalize_permissions("rz").is_err());
    }

    #[test]
    fn query_carries_expected_fields() {
        let q = blob_sas_query("acct", TEST_KEY, "cont", "dir/a.png", "racwd", 12).unwrap();
        assert!(q.contains("sv=2018-11-09"));
        assert!(q.contains("sr=b"));
        assert!(q.contains("sp=racwd"));
        assert!(q.contains("sig="));
        assert!(q.contains("st=") && q.contains("se="));
    }

    #[test]
    fn window_is_symmetric_around_now() {
        let q = blob_sas_query("acct", TEST_KEY, "c", "b", "r", 6).unwrap();
        let pick = |tag: &str| -> NaiveDateTime {
            let raw = q
                .split('&')
                .find_map(|kv| kv.strip_prefix(tag))
                .unwrap()
                .to_string();
            let decoded = urlencoding::decode(&raw).unwrap();
            NaiveDateTime::parse_from_str(&decoded, "%Y-%m-%dT%H:%M:%SZ").unwrap()
        };
        let st = pick("st=");
        let se = pick("se=");
        // 起点落在过去、总窗口恰为 2 × expiry
        assert_eq!((se - st).num_hours(), 12);
        assert!(st < Utc::now().naive_utc());
    }

    #[test]
    fn rejects_non_positive_expiry() {
        assert!(blob_sas_query("acct", TEST_KEY, "c", "b", "r", 0).is_err());
    }

    #[test]
    fn rejects_garbage_account_key() {
        assert!(blob_sas_query("acct", "not base64!!", "c", "b", "r", 1).is_err());
    }
}
