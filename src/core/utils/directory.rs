//! 目录操作

use std::{collections::HashSet, path::Path};

use walkdir::{DirEntry, WalkDir};

/// 递归遍历目录
///
/// 跟随符号链接, 同一目录下按文件名排序; 不可读的条目(包括链接循环)直接跳过。
/// 目录不存在时返回空迭代器。
pub fn walk_directory(directory: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(directory)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
}

/// 检查文件扩展名是否在允许列表中
///
/// 扩展名带点且为小写, 比较时忽略大小写
pub fn has_allowed_extension(path: &Path, extensions: &HashSet<&str>) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(format!(".{}", ext.to_lowercase()).as_str()))
        .unwrap_or(false)
}

/// 统一路径分隔符为 `/`
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// 获取相对于基础目录的路径, 使用 `/` 作为分隔符
///
/// 路径等于基础目录时返回空字符串
pub fn relative_path(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<&str>>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_has_allowed_extension() {
        let exts: HashSet<&str> = [".safetensors", ".ckpt"].into_iter().collect();
        assert!(has_allowed_extension(Path::new("a/b.safetensors"), &exts));
        assert!(has_allowed_extension(Path::new("B.CKPT"), &exts));
        assert!(!has_allowed_extension(Path::new("notes.txt"), &exts));
        assert!(!has_allowed_extension(Path::new("safetensors"), &exts));
    }

    #[test]
    fn test_relative_path() {
        let base = PathBuf::from("/models/loras");
        assert_eq!(
            relative_path(&base.join("sdxl").join("a.pt"), &base).as_deref(),
            Some("sdxl/a.pt")
        );
        assert_eq!(relative_path(&base, &base).as_deref(), Some(""));
        assert_eq!(relative_path(Path::new("/other/a.pt"), &base), None);
    }

    #[test]
    fn test_walk_missing_directory() {
        let entries = walk_directory(Path::new("/definitely/not/here")).count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_normalize_separators() {
        assert_eq!(normalize_separators(r"a\b\c.pt"), "a/b/c.pt");
    }
}
