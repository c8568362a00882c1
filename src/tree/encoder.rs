//! 下拉框输入描述
//!
//! 生成与前端框架无关的下拉框描述, 由 `wrapper::comfyui::node_input` 转换为 ComfyUI 的输入定义。
//! 目录树通过 [`attach_tree_metadata`] 写入唯一的元数据槽位 [`TREE_METADATA_KEY`]。

use std::collections::BTreeSet;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    tree::{
        builder::{build_tree, TreeNode},
        builtins::{builtins_tree, BuiltinVae, BUILTINS_FOLDER},
        child_id::{encode_child_id, FolderScope},
        resolver::VAE_FOLDER_TYPES,
        scanner::{list_dirs, list_files},
        selection::NONE_OPTION,
    },
    wrapper::comfy::folder_paths::FolderRegistry,
};

/// 输入选项中目录树元数据的键名
pub const TREE_METADATA_KEY: &str = "sk_tree";
/// 目录树元数据版本
pub const TREE_METADATA_VERSION: u32 = 1;

/// 目录树元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeMetadata {
    pub version: u32,
    pub roots: Vec<TreeNode>,
}

impl TreeMetadata {
    pub fn new(roots: Vec<TreeNode>) -> Self {
        Self {
            version: TREE_METADATA_VERSION,
            roots,
        }
    }
}

/// 下拉框
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboInput {
    /// 输入名称
    pub id: String,
    pub options: Vec<String>,
    pub tooltip: String,
    pub tree: Option<TreeMetadata>,
}

impl ComboInput {
    /// 创建下拉框, 选项为空时使用占位选项
    pub fn new(id: impl Into<String>, options: Vec<String>, tooltip: impl Into<String>) -> Self {
        let options = if options.is_empty() {
            vec![NONE_OPTION.to_string()]
        } else {
            options
        };
        Self {
            id: id.into(),
            options,
            tooltip: tooltip.into(),
            tree: None,
        }
    }

    /// 默认选中项
    pub fn default_option(&self) -> &str {
        self.options.first().map(String::as_str).unwrap_or(NONE_OPTION)
    }
}

/// 文件夹选择框与各文件夹的文件下拉框
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderFileInputs {
    pub folder: ComboInput,
    pub files: Vec<ComboInput>,
}

/// 附加目录树元数据
pub fn attach_tree_metadata(mut input: ComboInput, roots: Vec<TreeNode>) -> ComboInput {
    input.tree = Some(TreeMetadata::new(roots));
    input
}

/// 单个下拉框, 列出文件夹类型下的所有模型文件
pub fn flat_file_input<R>(
    registry: &R,
    folder_type: &str,
    input_id: &str,
    tooltip: &str,
) -> Result<ComboInput, Error>
where
    R: FolderRegistry + ?Sized,
{
    let options = list_files(registry, folder_type, "")?;
    let roots = build_tree(registry, folder_type, input_id, FolderScope::Single)?;
    Ok(attach_tree_metadata(
        ComboInput::new(input_id, options, tooltip),
        roots,
    ))
}

/// 两级输入: 文件夹 -> 文件
///
/// 没有任何模型文件时, 文件夹选择框只有占位选项且不生成文件下拉框
pub fn folder_file_inputs<R>(
    registry: &R,
    folder_type: &str,
    scope: FolderScope<'_>,
    folder_id: &str,
    file_id: &str,
    tooltip: &str,
) -> Result<FolderFileInputs, Error>
where
    R: FolderRegistry + ?Sized,
{
    let (folders, files) = folder_combos(registry, folder_type, scope, file_id, tooltip)?;
    let roots = build_tree(registry, folder_type, file_id, scope)?;

    Ok(FolderFileInputs {
        folder: attach_tree_metadata(ComboInput::new(folder_id, folders, tooltip), roots),
        files,
    })
}

/// VAE 输入: 内置 VAE 与 `vae`/`vae_approx` 两个文件夹类型
pub fn vae_inputs<R>(
    registry: &R,
    folder_id: &str,
    file_id: &str,
    tooltip: &str,
) -> Result<FolderFileInputs, Error>
where
    R: FolderRegistry + ?Sized,
{
    let mut folders = vec![BUILTINS_FOLDER.to_string()];
    let mut files = vec![ComboInput::new(
        encode_child_id(file_id, BUILTINS_FOLDER),
        BuiltinVae::names(),
        tooltip,
    )];
    let mut roots = vec![builtins_tree(file_id)];

    for folder_type in VAE_FOLDER_TYPES {
        let scope = FolderScope::Prefixed(folder_type);
        let (type_folders, type_files) =
            folder_combos(registry, folder_type, scope, file_id, tooltip)?;
        folders.extend(type_folders);
        files.extend(type_files);
        roots.extend(build_tree(registry, folder_type, file_id, scope)?);
    }

    Ok(FolderFileInputs {
        folder: attach_tree_metadata(ComboInput::new(folder_id, folders, tooltip), roots),
        files,
    })
}

/// 每个包含模型文件的目录生成一个文件夹键与对应的文件下拉框
///
/// 名为 `root` 的目录与根目录得到相同的键, 此时两者的文件合并到同一个下拉框
fn folder_combos<R>(
    registry: &R,
    folder_type: &str,
    scope: FolderScope<'_>,
    file_id: &str,
    tooltip: &str,
) -> Result<(Vec<String>, Vec<ComboInput>), Error>
where
    R: FolderRegistry + ?Sized,
{
    let mut folders = Vec::new();
    let mut files: Vec<ComboInput> = Vec::new();

    for rel_dir in list_dirs(registry, folder_type)? {
        let options = list_files(registry, folder_type, &rel_dir)?;
        if options.is_empty() {
            continue;
        }
        let folder = scope.folder_key(&rel_dir);
        let child_id = encode_child_id(file_id, &folder);

        if let Some(existing) = files.iter_mut().find(|f| f.id == child_id) {
            warn!("folder key collision, merged into {child_id}: {rel_dir}");
            let merged = existing
                .options
                .drain(..)
                .chain(options)
                .collect::<BTreeSet<_>>();
            existing.options = merged.into_iter().collect();
            continue;
        }

        files.push(ComboInput::new(child_id, options, tooltip));
        folders.push(folder);
    }

    Ok((folders, files))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, fs, path::PathBuf};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        tree::{
            resolver::{resolve_selected_path, resolve_vae_selection, VaeSource},
            selection::Selection,
        },
        wrapper::comfy::folder_paths::FolderPaths,
    };

    fn touch(dir: &TempDir, rel: &str) -> anyhow::Result<PathBuf> {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, b"")?;
        Ok(path)
    }

    fn registry(dir: &TempDir, entries: &[(&str, &str)]) -> FolderPaths {
        let mut registry = FolderPaths::empty(dir.path());
        for (folder_type, base) in entries {
            registry.add_model_folder_path(folder_type, dir.path().join(base), false);
        }
        registry
    }

    #[test]
    fn test_empty_folder_emits_sentinel() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let registry = registry(&dir, &[("loras", "loras")]);

        let flat = flat_file_input(&registry, "loras", "lora", "")?;
        assert_eq!(flat.options, vec!["<none>"]);
        assert_eq!(flat.tree, Some(TreeMetadata::new(Vec::new())));

        let inputs =
            folder_file_inputs(&registry, "loras", FolderScope::Single, "lora_folder", "lora", "")?;
        assert_eq!(inputs.folder.options, vec!["<none>"]);
        assert!(inputs.files.is_empty());

        let err = resolve_selected_path(
            &registry,
            "loras",
            &Selection::Flat(flat.default_option().to_string()),
            "lora",
            "lora",
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoFileSelected(_)));
        Ok(())
    }

    #[test]
    fn test_folder_file_inputs() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        touch(&dir, "loras/foo/bar.safetensors")?;
        touch(&dir, "loras/foo/deep/baz.pt")?;
        fs::create_dir_all(dir.path().join("loras/empty"))?;
        let registry = registry(&dir, &[("loras", "loras")]);

        let inputs =
            folder_file_inputs(&registry, "loras", FolderScope::Single, "lora_folder", "lora", "")?;
        assert_eq!(inputs.folder.id, "lora_folder");
        assert_eq!(inputs.folder.options, vec!["root", "foo", "foo/deep"]);

        let ids = inputs.files.iter().map(|f| f.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["lora__root", "lora__foo", "lora__foo__deep"]);
        assert_eq!(inputs.files[2].options, vec!["foo/deep/baz.pt"]);

        // 树中每个叶子的 child_id 都对应一个文件下拉框
        let tree = inputs.folder.tree.as_ref().map(|t| t.roots.clone()).unwrap_or_default();
        for root in &tree {
            for leaf in root.leaves() {
                let combo = inputs.files.iter().find(|f| f.id == leaf.child_id);
                assert!(combo.is_some_and(|c| c.options.contains(&leaf.file)), "{leaf:?}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_every_emitted_value_resolves() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        touch(&dir, "checkpoints/a.safetensors")?;
        touch(&dir, "checkpoints/sd15/b.ckpt")?;
        touch(&dir, "extra/sdxl/c.safetensors")?;
        let registry = registry(&dir, &[("checkpoints", "checkpoints"), ("checkpoints", "extra")]);

        let inputs = folder_file_inputs(
            &registry,
            "checkpoints",
            FolderScope::Single,
            "ckpt_folder",
            "ckpt",
            "",
        )?;
        let roots = inputs.folder.tree.map(|t| t.roots).unwrap_or_default();
        let leaves = roots.iter().flat_map(|r| r.leaves()).collect::<Vec<_>>();
        assert_eq!(leaves.len(), 3);

        for leaf in leaves {
            let selection = Selection::Nested(BTreeMap::from([
                ("ckpt_folder".to_string(), leaf.folder.clone()),
                (leaf.child_id.clone(), leaf.file.clone()),
            ]));
            let path =
                resolve_selected_path(&registry, "checkpoints", &selection, "ckpt_folder", "ckpt")?;
            assert!(path.exists());
            assert!(path.ends_with(&leaf.file));
        }

        let flat = flat_file_input(&registry, "checkpoints", "ckpt", "")?;
        for option in &flat.options {
            let selection = Selection::Flat(option.clone());
            let path = resolve_selected_path(&registry, "checkpoints", &selection, "ckpt", "ckpt")?;
            assert!(path.ends_with(option));
        }
        Ok(())
    }

    #[test]
    fn test_root_named_directory_merges_with_base_root() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        touch(&dir, "loras/top.pt")?;
        touch(&dir, "loras/root/x.pt")?;
        let registry = registry(&dir, &[("loras", "loras")]);

        let inputs =
            folder_file_inputs(&registry, "loras", FolderScope::Single, "lora_folder", "lora", "")?;
        assert_eq!(inputs.folder.options, vec!["root"]);
        assert_eq!(inputs.files.len(), 1);
        assert_eq!(inputs.files[0].id, "lora__root");
        assert_eq!(inputs.files[0].options, vec!["root/x.pt", "top.pt"]);

        for file in &inputs.files[0].options {
            let selection = Selection::Nested(BTreeMap::from([
                ("lora_folder".to_string(), "root".to_string()),
                ("lora__root".to_string(), file.clone()),
            ]));
            let path = resolve_selected_path(&registry, "loras", &selection, "lora_folder", "lora")?;
            assert!(path.ends_with(file));
        }
        Ok(())
    }

    #[test]
    fn test_vae_inputs() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        touch(&dir, "vae/sdxl_vae.safetensors")?;
        touch(&dir, "vae_approx/flux/taef1_decoder.pth")?;
        let registry = registry(&dir, &[("vae", "vae"), ("vae_approx", "vae_approx")]);

        let inputs = vae_inputs(&registry, "vae_folder", "vae_name", "")?;
        assert_eq!(
            inputs.folder.options,
            vec!["builtins", "vae", "vae_approx", "vae_approx/flux"]
        );
        assert_eq!(inputs.files[0].id, "vae_name__builtins");
        assert_eq!(
            inputs.files[0].options,
            vec!["pixel_space", "taesd", "taesdxl", "taesd3", "taef1"]
        );
        assert_eq!(inputs.files[3].id, "vae_name__vae_approx__flux");

        let roots = inputs.folder.tree.map(|t| t.roots).unwrap_or_default();
        let labels = roots.iter().map(|r| r.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["builtins", "vae", "vae_approx"]);

        for leaf in roots.iter().flat_map(|r| r.leaves()) {
            let selection = Selection::Nested(BTreeMap::from([
                ("vae_folder".to_string(), leaf.folder.clone()),
                (leaf.child_id.clone(), leaf.file.clone()),
            ]));
            match resolve_vae_selection(&registry, &selection, "vae_folder", "vae_name")? {
                VaeSource::Builtin(vae) => assert_eq!(vae.to_string(), leaf.file),
                VaeSource::File(path) => assert!(path.ends_with(&leaf.file)),
            }
        }
        Ok(())
    }
}
