//! 本地后端集成测试：目录即容器的语义

use blobsync::config::AccessLevel;
use blobsync::storage::LocalProvider;
use blobsync::{Provider, Storage};

#[tokio::test]
async fn containers_are_directories() {
    let base = tempfile::tempdir().unwrap();
    let provider = LocalProvider::new(base.path().to_str().unwrap()).unwrap();

    provider
        .create_container("photos", AccessLevel::Private)
        .await
        .unwrap();
    provider
        .create_container("backups", AccessLevel::Blob)
        .await
        .unwrap();

    let containers = provider.list_containers().await.unwrap();
    let names: Vec<_> = containers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["backups", "photos"]);

    provider.remove_container("backups").await.unwrap();
    assert_eq!(provider.list_containers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn prefix_listing_and_delete() {
    let base = tempfile::tempdir().unwrap();
    let provider = LocalProvider::new(base.path().to_str().unwrap()).unwrap();
    let storage = provider.container("data").await.unwrap();

    let src = tempfile::tempdir().unwrap();
    let file = src.path().join("f.txt");
    std::fs::write(&file, b"payload").unwrap();

    storage.upload_file("2024/a.txt", &file, "text/plain").await.unwrap();
    storage.upload_file("2024/b.txt", &file, "text/plain").await.unwrap();
    storage.upload_file("2025/c.txt", &file, "text/plain").await.unwrap();

    let all = storage.list_objects(None).await.unwrap();
    assert_eq!(all.len(), 3);
    // 清单自带内容 MD5，校验和策略在本地后端同样可用
    assert!(all.iter().all(|o| o.content_md5.is_some()));

    let year = storage.list_objects(Some("2024/")).await.unwrap();
    assert_eq!(year.len(), 2);

    storage.delete("2024/a.txt").await.unwrap();
    // 重复删除不报错
    storage.delete("2024/a.txt").await.unwrap();
    assert_eq!(storage.list_objects(Some("2024/")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tmp_suffixed_keys_survive_sibling_writes() {
    let base = tempfile::tempdir().unwrap();
    let provider = LocalProvider::new(base.path().to_str().unwrap()).unwrap();
    let storage = provider.container("data").await.unwrap();

    let src = tempfile::tempdir().unwrap();
    let first = src.path().join("first");
    let second = src.path().join("second");
    std::fs::write(&first, b"tmp object").unwrap();
    std::fs::write(&second, b"txt object").unwrap();

    // x.tmp 和 x.txt 的临时文件路径不得相撞
    storage.upload_file("x.tmp", &first, "application/octet-stream").await.unwrap();
    storage.upload_file("x.txt", &second, "text/plain").await.unwrap();

    let mut names: Vec<_> = storage
        .list_objects(None)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.path)
        .collect();
    names.sort();
    assert_eq!(names, vec!["x.tmp", "x.txt"]);

    let out = src.path().join("roundtrip");
    storage.download_file("x.tmp", &out).await.unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), b"tmp object");
}

#[tokio::test]
async fn sas_is_rejected() {
    let base = tempfile::tempdir().unwrap();
    let provider = LocalProvider::new(base.path().to_str().unwrap()).unwrap();
    assert!(provider.signed_url("c", "b", "r", 1).is_err());
}
