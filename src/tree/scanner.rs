//! 模型目录扫描
//!
//! 在文件夹类型的所有基础目录下查找子目录与模型文件。
//! 基础目录缺失或不可读时静默跳过, 空结果是合法状态。

use std::collections::{BTreeSet, HashSet};

use lazy_static::lazy_static;
use log::debug;

use crate::{
    core::utils::directory::{has_allowed_extension, normalize_separators, relative_path, walk_directory},
    error::Error,
    wrapper::comfy::folder_paths::FolderRegistry,
};

// 加载节点接受的模型文件扩展名
lazy_static! {
    pub static ref ALLOWED_EXTENSIONS: HashSet<&'static str> = {
        let mut set = HashSet::new();
        set.insert(".safetensors");
        set.insert(".ckpt");
        set.insert(".bin");
        set.insert(".pt");
        set.insert(".pth");
        set
    };
}

/// 列出所有子目录(相对路径), 包含表示根目录的空字符串
pub fn list_dirs<R>(registry: &R, folder_type: &str) -> Result<Vec<String>, Error>
where
    R: FolderRegistry + ?Sized,
{
    let mut dirs = BTreeSet::from([String::new()]);

    for base in registry.get_folder_paths(folder_type)? {
        for entry in walk_directory(&base).filter(|e| e.depth() > 0 && e.file_type().is_dir()) {
            if let Some(rel) = relative_path(entry.path(), &base) {
                dirs.insert(rel);
            }
        }
    }

    Ok(dirs.into_iter().collect())
}

/// 列出相对目录下(递归)的模型文件
///
/// 返回的路径相对于基础目录, 即包含 `rel_dir` 前缀。
/// 多个基础目录下的同名相对路径合并为一项。
pub fn list_files<R>(registry: &R, folder_type: &str, rel_dir: &str) -> Result<Vec<String>, Error>
where
    R: FolderRegistry + ?Sized,
{
    let rel_dir = normalize_separators(rel_dir);
    let rel_dir = rel_dir.trim_matches('/');
    let mut files = BTreeSet::new();

    for base in registry.get_folder_paths(folder_type)? {
        let dir_path = if rel_dir.is_empty() {
            base.clone()
        } else {
            base.join(rel_dir)
        };
        if !dir_path.is_dir() {
            debug!("skip missing directory: {}", dir_path.display());
            continue;
        }

        for entry in walk_directory(&dir_path) {
            if !entry.file_type().is_file()
                || !has_allowed_extension(entry.path(), &ALLOWED_EXTENSIONS)
            {
                continue;
            }
            if let Some(rel) = relative_path(entry.path(), &base) {
                files.insert(rel);
            }
        }
    }

    Ok(files.into_iter().collect())
}
