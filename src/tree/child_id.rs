//! 子输入命名约定
//!
//! 每个文件夹对应一个文件下拉框, 名称为 `{file_id}__{sanitized}`:
//! 路径分隔符替换为 `__`, 根目录映射为 `root`。
//! 树节点、编码器与解析器都通过这里生成和还原名称, 三者必须逐字节一致。

use crate::core::utils::directory::normalize_separators;

/// 根目录的文件夹键
pub const ROOT_FOLDER: &str = "root";

/// 子输入名称连接符, 同时替换路径分隔符
pub const CHILD_ID_JOINER: &str = "__";

/// 文件夹范围
///
/// 决定文件夹选择框输出的键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderScope<'a> {
    /// 单一文件夹类型: `root` 或相对目录
    Single,
    /// 多文件夹类型: `folder_type` 或 `folder_type/rel_dir`
    Prefixed(&'a str),
}

impl FolderScope<'_> {
    /// 相对目录对应的文件夹键
    pub fn folder_key(&self, rel_dir: &str) -> String {
        let rel_dir = normalize_separators(rel_dir);
        let rel_dir = rel_dir.trim_matches('/');
        match (self, rel_dir.is_empty()) {
            (FolderScope::Single, true) => ROOT_FOLDER.to_string(),
            (FolderScope::Single, false) => rel_dir.to_string(),
            (FolderScope::Prefixed(folder_type), true) => folder_type.to_string(),
            (FolderScope::Prefixed(folder_type), false) => format!("{folder_type}/{rel_dir}"),
        }
    }
}

/// 将文件夹键转换为名称片段
pub fn sanitize_folder_key(folder_key: &str) -> String {
    let key = normalize_separators(folder_key);
    let key = key.trim_matches('/');
    if key.is_empty() {
        return ROOT_FOLDER.to_string();
    }
    key.replace('/', CHILD_ID_JOINER)
}

/// 子输入名称前缀 `{file_id}__`
pub fn child_id_prefix(file_id: &str) -> String {
    format!("{file_id}{CHILD_ID_JOINER}")
}

/// 生成文件夹对应的文件下拉框名称
pub fn encode_child_id(file_id: &str, folder_key: &str) -> String {
    format!("{}{}", child_id_prefix(file_id), sanitize_folder_key(folder_key))
}

/// 从子输入名称还原文件夹键
///
/// 名称不属于 `file_id` 时返回 None。
///
/// 命名约定存在两处冲突, 都无法还原:
/// - 目录名本身包含 `__` 时, 与多级目录得到相同的名称(`a__b` 与 `a/b`)
/// - 名为 `root` 的顶层目录与根目录得到相同的名称, 编码器把两者的文件合并到同一个下拉框
pub fn decode_child_id(file_id: &str, child_id: &str) -> Option<String> {
    let suffix = child_id.strip_prefix(&child_id_prefix(file_id))?;
    if suffix.is_empty() {
        return Some(ROOT_FOLDER.to_string());
    }
    Some(suffix.replace(CHILD_ID_JOINER, "/"))
}
