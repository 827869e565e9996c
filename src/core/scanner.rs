//! 本地目录扫描 - 生成上传用的文件清单

use crate::core::path::remote_key;
use crate::error::SyncError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// 扫描发现的一个本地文件。创建后不可变，传输批次结束即丢弃，
/// 不做任何持久化。
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// 本地文件系统路径
    pub local_path: PathBuf,
    /// 容器内对象名：相对扫描根目录、正斜杠、无前导斜杠
    pub remote_key: String,
    /// 按扩展名推断的 MIME 类型；无法识别为 None，不猜错误的类型
    pub content_type: Option<String>,
}

/// 一次扫描的结果，顺序即目录遍历顺序。
/// 各条目相互独立，调和过程不依赖任何排序。
pub type Manifest = Vec<FileEntry>;

/// 目录扫描器
pub struct FolderScanner;

impl FolderScanner {
    /// 递归扫描 `root` 下的所有常规文件。
    ///
    /// 根目录不存在时连同中间目录一并创建，新建的空目录扫出
    /// 空清单，不是错误。不跟随符号链接，目录软链成环不会挂死
    /// （代价是链接指向的子树不会入清单）。
    pub async fn scan(root: &str) -> Result<Manifest, SyncError> {
        if root.trim().is_empty() {
            return Err(SyncError::config("root folder is not inserted"));
        }

        let root_owned = root.to_string();
        let manifest = tokio::task::spawn_blocking(move || scan_blocking(&root_owned))
            .await
            .map_err(|e| SyncError::Scan(e.into()))??;

        info!("扫描完成: {} 共 {} 个文件", root, manifest.len());
        Ok(manifest)
    }
}

fn scan_blocking(root: &str) -> Result<Manifest, SyncError> {
    let root_path = Path::new(root);
    if !root_path.is_dir() {
        std::fs::create_dir_all(root_path).map_err(|e| SyncError::Scan(e.into()))?;
    }

    let mut manifest = Vec::new();
    for entry in WalkDir::new(root_path).follow_links(false) {
        // 遍历失败直接上抛，不允许静默的部分扫描
        let entry = entry.map_err(|e| SyncError::Scan(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        // 对象名始终相对最初的扫描根目录计算，与递归深度无关
        let full = entry.path().to_string_lossy();
        let key = remote_key(&full, root);
        let content_type = mime_guess::from_path(entry.path())
            .first_raw()
            .map(String::from);

        debug!("发现文件: {} -> {}", full, key);
        manifest.push(FileEntry {
            local_path: entry.path().to_path_buf(),
            remote_key: key,
            content_type,
        });
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_root_is_config_error() {
        let err = FolderScanner::scan("").await.unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[tokio::test]
    async fn missing_root_is_created_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("fresh");
        let manifest = FolderScanner::scan(root.to_str().unwrap()).await.unwrap();
        assert!(manifest.is_empty());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn nested_files_get_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a");
        std::fs::create_dir_all(root.join("c")).unwrap();
        std::fs::write(root.join("b.txt"), b"b").unwrap();
        std::fs::write(root.join("c/d.txt"), b"d").unwrap();

        let manifest = FolderScanner::scan(root.to_str().unwrap()).await.unwrap();
        let mut keys: Vec<_> = manifest.iter().map(|e| e.remote_key.clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["b.txt", "c/d.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_subdirectory_fails_the_scan() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("f.txt"), b"x").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // root 不受权限位约束，此时场景不成立，直接放过
        if std::fs::read_dir(&locked).is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = FolderScanner::scan(dir.path().to_str().unwrap()).await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        // 遍历失败必须整体报错，不允许悄悄丢掉读不到的子树
        assert!(matches!(result, Err(SyncError::Scan(_))));
    }

    #[tokio::test]
    async fn content_type_inference() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("p.png"), b"x").unwrap();
        std::fs::write(root.join("odd.zzz9"), b"x").unwrap();

        let manifest = FolderScanner::scan(root.to_str().unwrap()).await.unwrap();
        let by_key = |k: &str| {
            manifest
                .iter()
                .find(|e| e.remote_key == k)
                .unwrap()
                .content_type
                .clone()
        };
        assert_eq!(by_key("p.png").as_deref(), Some("image/png"));
        // 未知扩展名必须是 None，而不是错误的类型
        assert_eq!(by_key("odd.zzz9"), None);
    }
}
