//! 路径规范化 - 本地路径到远端对象名

/// 把扫描到的完整路径换算成容器内的对象名。
///
/// 只有当 `full_path` 确实以 `root` 开头时才剥掉前缀，否则原样返回
/// （这是调用方的错误，不做静默修补）。分隔符统一成 `/`，最后最多
/// 去掉一个前导斜杠，避免把真正嵌套的路径压扁。纯函数。
pub fn remote_key(full_path: &str, root: &str) -> String {
    let stripped = full_path.strip_prefix(root).unwrap_or(full_path);
    let slashed = stripped.replace('\\', "/");
    match slashed.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => slashed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_root_and_leading_slash() {
        assert_eq!(remote_key("/data/site/img/a.png", "/data/site"), "img/a.png");
        assert_eq!(remote_key("/data/site/a.png", "/data/site/"), "a.png");
    }

    #[test]
    fn converts_backslashes() {
        assert_eq!(remote_key(r"site\img\a.png", "site"), "img/a.png");
    }

    #[test]
    fn no_backslash_no_leading_slash() {
        for (full, root) in [
            ("/r/a/b.txt", "/r"),
            (r"r\x\y.bin", "r"),
            ("/r/deep/er/f", "/r"),
        ] {
            let key = remote_key(full, root);
            assert!(!key.contains('\\'), "key {:?}", key);
            assert!(!key.starts_with('/'), "key {:?}", key);
        }
    }

    #[test]
    fn only_one_leading_slash_removed() {
        // 前缀剥离后剩 "//nested/a"，只去掉第一个斜杠
        assert_eq!(remote_key("/r//nested/a", "/r"), "/nested/a");
    }

    #[test]
    fn unrelated_root_returns_input() {
        assert_eq!(remote_key("elsewhere/a.txt", "/r"), "elsewhere/a.txt");
    }
}
