//! 目录树构建
//!
//! 把扫描到的模型文件组织成 label/value/children 树, 供前端渲染层级选择菜单。
//! 只有叶子节点携带选择值; 文件夹节点只在通往模型文件的路径上创建, 不会出现空文件夹。

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    core::utils::directory::{has_allowed_extension, relative_path, walk_directory},
    error::Error,
    tree::{
        child_id::{encode_child_id, FolderScope},
        scanner::ALLOWED_EXTENSIONS,
    },
    wrapper::comfy::folder_paths::FolderRegistry,
};

/// 叶子节点的选择值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionValue {
    /// 文件夹键
    pub folder: String,
    /// 相对于基础目录的文件路径
    pub file: String,
    /// 该文件所在文件夹的下拉框名称
    pub child_id: String,
}

/// 树节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub label: String,
    pub value: Option<SelectionValue>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn folder(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(label: impl Into<String>, value: SelectionValue) -> Self {
        Self {
            label: label.into(),
            value: Some(value),
            children: Vec::new(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.value.is_none()
    }

    /// 深度优先收集所有叶子节点的选择值
    pub fn leaves(&self) -> Vec<&SelectionValue> {
        let mut values = Vec::new();
        self.collect_leaves(&mut values);
        values
    }

    fn collect_leaves<'a>(&'a self, values: &mut Vec<&'a SelectionValue>) {
        if let Some(value) = &self.value {
            values.push(value);
        }
        for child in &self.children {
            child.collect_leaves(values);
        }
    }
}

/// 构建文件夹类型的目录树
///
/// 每个包含模型文件的基础目录生成一个顶层节点, 以目录名为标签。
/// 多个基础目录下相同的相对路径只保留第一个基础目录中的那一项,
/// 与解析时"先注册的基础目录优先"保持一致。
pub fn build_tree<R>(
    registry: &R,
    folder_type: &str,
    file_id: &str,
    scope: FolderScope<'_>,
) -> Result<Vec<TreeNode>, Error>
where
    R: FolderRegistry + ?Sized,
{
    let mut tree = Vec::new();
    let mut seen = HashSet::new();

    for base in registry.get_folder_paths(folder_type)? {
        let mut base_node = TreeNode::folder(base_label(&base, folder_type));

        for entry in walk_directory(&base) {
            if !entry.file_type().is_file()
                || !has_allowed_extension(entry.path(), &ALLOWED_EXTENSIONS)
            {
                continue;
            }
            let Some(rel_path) = relative_path(entry.path(), &base) else {
                continue;
            };
            if !seen.insert(rel_path.clone()) {
                continue;
            }

            let (rel_dir, file_name) = rel_path
                .rsplit_once('/')
                .unwrap_or(("", rel_path.as_str()));
            let folder = scope.folder_key(rel_dir);
            let value = SelectionValue {
                child_id: encode_child_id(file_id, &folder),
                folder,
                file: rel_path.clone(),
            };

            let parts = rel_dir.split('/').collect::<Vec<&str>>();
            ensure_branch(&mut base_node.children, &parts)
                .push(TreeNode::leaf(file_name, value));
        }

        if !base_node.children.is_empty() {
            tree.push(base_node);
        }
    }

    Ok(tree)
}

/// 基础目录的显示名称
fn base_label(base: &Path, folder_type: &str) -> String {
    base.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(folder_type)
        .to_string()
}

/// 确保路径上的文件夹节点存在, 返回最末层的子节点列表
fn ensure_branch<'a>(children: &'a mut Vec<TreeNode>, parts: &[&str]) -> &'a mut Vec<TreeNode> {
    let mut current = children;
    for part in parts.iter().filter(|p| !p.is_empty()) {
        let index = match current
            .iter()
            .position(|c| c.is_folder() && c.label == *part)
        {
            Some(index) => index,
            None => {
                current.push(TreeNode::folder(*part));
                current.len() - 1
            }
        };
        current = &mut current[index].children;
    }
    current
}
