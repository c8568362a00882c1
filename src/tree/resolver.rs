//! 选择值解析
//!
//! 把前端提交的选择值还原为相对路径, 并在文件夹类型的基础目录中查找实际文件。
//! 每次调用都重新访问文件系统, 不做缓存。
//!
//! 映射形态的查找顺序:
//! 1. 读取文件夹选择框的值(缺失时使用默认文件夹), 由命名约定得到文件下拉框名称并取值,
//!    取不到时回退到 `file_id` 本身(单下拉框/旧版调用方)
//! 2. 仍无有效值时, 按键名顺序查找任意 `{file_id}__*` 键的有效值, 并从键名后缀还原文件夹
//! 3. 都没有则视为未选择文件

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    core::utils::directory::normalize_separators,
    error::Error,
    tree::{
        builtins::{BuiltinVae, BUILTINS_FOLDER},
        child_id::{child_id_prefix, decode_child_id, encode_child_id, ROOT_FOLDER},
        selection::{is_valid_value, Selection},
    },
    wrapper::comfy::folder_paths::FolderRegistry,
};

/// VAE 输入覆盖的文件夹类型
pub const VAE_FOLDER_TYPES: [&str; 2] = ["vae", "vae_approx"];

/// 映射中选中的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapChoice {
    /// 文件夹键
    pub folder: String,
    /// 相对路径或内置名称
    pub file: String,
}

/// VAE 来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaeSource {
    Builtin(BuiltinVae),
    File(PathBuf),
}

/// 解析选择值为绝对路径
pub fn resolve_selected_path<R>(
    registry: &R,
    folder_type: &str,
    selection: &Selection,
    folder_id: &str,
    file_id: &str,
) -> Result<PathBuf, Error>
where
    R: FolderRegistry + ?Sized,
{
    match selection {
        Selection::Bare(path) | Selection::Flat(path) => {
            resolve_path_string(registry, folder_type, path, file_id)
        }
        Selection::Nested(map) => resolve_nested(registry, folder_type, map, folder_id, file_id),
    }
}

/// 字符串形态: 直接视为相对路径
fn resolve_path_string<R>(
    registry: &R,
    folder_type: &str,
    path: &str,
    file_id: &str,
) -> Result<PathBuf, Error>
where
    R: FolderRegistry + ?Sized,
{
    if !is_valid_value(path) {
        return Err(Error::NoFileSelected(format!("{file_id} ({folder_type})")));
    }

    probe_base_dirs(registry, folder_type, path)?
        .ok_or_else(|| Error::PathNotFound(normalize_separators(path)))
}

/// 映射形态
fn resolve_nested<R>(
    registry: &R,
    folder_type: &str,
    map: &BTreeMap<String, String>,
    folder_id: &str,
    file_id: &str,
) -> Result<PathBuf, Error>
where
    R: FolderRegistry + ?Sized,
{
    let choice = choose_from_map(map, folder_id, file_id, ROOT_FOLDER)
        .ok_or_else(|| Error::NoFileSelected(format!("{file_id} ({folder_type})")))?;
    debug!(
        "selected {} in folder {} ({folder_type})",
        choice.file, choice.folder
    );

    probe_base_dirs(registry, folder_type, &choice.file)?
        .ok_or_else(|| Error::PathNotFound(normalize_separators(&choice.file)))
}

/// 从映射中取出选中的文件夹与文件
///
/// 没有任何有效值时返回 None
pub fn choose_from_map(
    map: &BTreeMap<String, String>,
    folder_id: &str,
    file_id: &str,
    default_folder: &str,
) -> Option<MapChoice> {
    let folder = map
        .get(folder_id)
        .filter(|f| !f.is_empty())
        .map(String::as_str)
        .unwrap_or(default_folder);

    let direct = map
        .get(&encode_child_id(file_id, folder))
        .filter(|v| is_valid_value(v))
        .or_else(|| map.get(file_id).filter(|v| is_valid_value(v)));
    if let Some(file) = direct {
        return Some(MapChoice {
            folder: folder.to_string(),
            file: file.clone(),
        });
    }

    // 界面状态过期或不完整时, 取任意一个有效的文件下拉框
    let prefix = child_id_prefix(file_id);
    map.iter()
        .filter(|(key, value)| key.starts_with(&prefix) && is_valid_value(value))
        .find_map(|(key, value)| {
            let folder = decode_child_id(file_id, key)?;
            debug!("recovered folder {folder} from stale input {key}");
            Some(MapChoice {
                folder,
                file: value.clone(),
            })
        })
}

/// 在基础目录中查找相对路径
///
/// 已存在的绝对路径原样返回; 否则按注册顺序查找, 第一个存在的路径优先
pub fn probe_base_dirs<R>(
    registry: &R,
    folder_type: &str,
    rel_path: &str,
) -> Result<Option<PathBuf>, Error>
where
    R: FolderRegistry + ?Sized,
{
    let rel_path = normalize_separators(rel_path);
    let path = Path::new(&rel_path);
    if path.is_absolute() && path.exists() {
        return Ok(Some(path.to_path_buf()));
    }

    for base in registry.get_folder_paths(folder_type)? {
        let candidate = base.join(&rel_path);
        if candidate.exists() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// 解析 VAE 选择值
///
/// 与其它加载节点不同, 未选择任何文件时回退到内置的 `pixel_space`,
/// VAE 节点必须总能输出结果。已选择但找不到的文件仍然报错。
pub fn resolve_vae_selection<R>(
    registry: &R,
    selection: &Selection,
    folder_id: &str,
    file_id: &str,
) -> Result<VaeSource, Error>
where
    R: FolderRegistry + ?Sized,
{
    let choice = match selection {
        Selection::Bare(name) | Selection::Flat(name) => {
            if !is_valid_value(name) {
                None
            } else if let Ok(builtin) = BuiltinVae::parse(name) {
                return Ok(VaeSource::Builtin(builtin));
            } else {
                return probe_vae_folders(registry, &VAE_FOLDER_TYPES, name);
            }
        }
        Selection::Nested(map) => choose_from_map(map, folder_id, file_id, BUILTINS_FOLDER),
    };

    let Some(choice) = choice else {
        debug!("no vae selected, fall back to {}", BuiltinVae::PixelSpace);
        return Ok(VaeSource::Builtin(BuiltinVae::PixelSpace));
    };

    if choice.folder == BUILTINS_FOLDER {
        return BuiltinVae::parse(&choice.file).map(VaeSource::Builtin);
    }

    // 文件夹键为 `folder_type` 或 `folder_type/rel_dir`
    let folder_type = choice.folder.split('/').next().unwrap_or_default();
    match VAE_FOLDER_TYPES.iter().find(|t| **t == folder_type) {
        Some(folder_type) => probe_vae_folders(registry, &[*folder_type], &choice.file),
        None => probe_vae_folders(registry, &VAE_FOLDER_TYPES, &choice.file),
    }
}

fn probe_vae_folders<R>(registry: &R, folder_types: &[&str], rel_path: &str) -> Result<VaeSource, Error>
where
    R: FolderRegistry + ?Sized,
{
    for folder_type in folder_types {
        if let Some(path) = probe_base_dirs(registry, folder_type, rel_path)? {
            return Ok(VaeSource::File(path));
        }
    }
    Err(Error::PathNotFound(normalize_separators(rel_path)))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::wrapper::comfy::folder_paths::FolderPaths;

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
    fn test_nested_selection() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let expected = touch(&dir, "loras/foo/bar.safetensors")?;
        let registry = registry(&dir, &[("loras", "loras")]);

        let selection =
            Selection::nested([("lora_folder", "foo"), ("lora__foo", "foo/bar.safetensors")]);
        let path = resolve_selected_path(&registry, "loras", &selection, "lora_folder", "lora")?;
        assert_eq!(path, expected);
        Ok(())
    }

    #[test]
    fn test_string_selection() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let expected = touch(&dir, "checkpoints/sd15/model.ckpt")?;
        let registry = registry(&dir, &[("checkpoints", "checkpoints")]);

        for selection in [
            Selection::Flat("sd15/model.ckpt".to_string()),
            Selection::Bare(r"sd15\model.ckpt".to_string()),
            Selection::Bare(expected.to_string_lossy().to_string()),
        ] {
            let path = resolve_selected_path(&registry, "checkpoints", &selection, "ckpt", "ckpt")?;
            assert_eq!(path, expected);
        }
        Ok(())
    }

    #[test]
    fn test_flat_nodes_share_folder_and_file_id() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let expected = touch(&dir, "checkpoints/a.safetensors")?;
        let registry = registry(&dir, &[("checkpoints", "checkpoints")]);

        let selection = Selection::nested([("ckpt", "a.safetensors")]);
        let path = resolve_selected_path(&registry, "checkpoints", &selection, "ckpt", "ckpt")?;
        assert_eq!(path, expected);
        Ok(())
    }

    #[test]
    fn test_sentinel_is_no_file_selected() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let registry = registry(&dir, &[("loras", "loras")]);

        for selection in [
            Selection::Flat("<none>".to_string()),
            Selection::Bare(String::new()),
            Selection::nested([("lora", "<none>")]),
            Selection::nested([("lora_folder", "root"), ("lora__root", "<none>")]),
            Selection::Nested(BTreeMap::new()),
        ] {
            let err = resolve_selected_path(&registry, "loras", &selection, "lora_folder", "lora")
                .unwrap_err();
            assert!(matches!(err, Error::NoFileSelected(_)), "{selection:?}");
        }
        Ok(())
    }

    #[test]
    fn test_fallback_to_file_id_key() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let expected = touch(&dir, "loras/x.pt")?;
        let registry = registry(&dir, &[("loras", "loras")]);

        let selection = Selection::nested([("lora_folder", "sdxl"), ("lora", "x.pt")]);
        let path = resolve_selected_path(&registry, "loras", &selection, "lora_folder", "lora")?;
        assert_eq!(path, expected);
        Ok(())
    }

    #[test]
    fn test_stale_child_key_recovery() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let expected = touch(&dir, "loras/style/ink.pt")?;
        let registry = registry(&dir, &[("loras", "loras")]);

        // 文件夹选择框指向已不存在的文件夹, 但另一个下拉框仍有有效值
        let selection = Selection::nested([
            ("lora_folder", "gone"),
            ("lora__root", "<none>"),
            ("lora__style", "style/ink.pt"),
        ]);
        let path = resolve_selected_path(&registry, "loras", &selection, "lora_folder", "lora")?;
        assert_eq!(path, expected);

        let choice = choose_from_map(
            &BTreeMap::from([("lora__style".to_string(), "style/ink.pt".to_string())]),
            "lora_folder",
            "lora",
            ROOT_FOLDER,
        );
        assert_eq!(
            choice,
            Some(MapChoice {
                folder: "style".to_string(),
                file: "style/ink.pt".to_string()
            })
        );
        Ok(())
    }

    #[test]
    fn test_deleted_file_is_path_not_found() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let file = touch(&dir, "loras/foo/bar.safetensors")?;
        let registry = registry(&dir, &[("loras", "loras")]);
        fs::remove_file(file)?;

        let selection =
            Selection::nested([("lora_folder", "foo"), ("lora__foo", "foo/bar.safetensors")]);
        let err = resolve_selected_path(&registry, "loras", &selection, "lora_folder", "lora")
            .unwrap_err();
        match err {
            Error::PathNotFound(path) => assert_eq!(path, "foo/bar.safetensors"),
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_first_registered_base_wins() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let first = touch(&dir, "fast/shared.pt")?;
        touch(&dir, "slow/shared.pt")?;
        let registry = registry(&dir, &[("checkpoints", "fast"), ("checkpoints", "slow")]);

        let selection = Selection::Flat("shared.pt".to_string());
        let path = resolve_selected_path(&registry, "checkpoints", &selection, "ckpt", "ckpt")?;
        assert_eq!(path, first);
        Ok(())
    }

    #[test]
    fn test_resolve_is_idempotent() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        touch(&dir, "loras/a/b.pt")?;
        let registry = registry(&dir, &[("loras", "loras")]);

        let selection = Selection::nested([("lora_folder", "a"), ("lora__a", "a/b.pt")]);
        let first = resolve_selected_path(&registry, "loras", &selection, "lora_folder", "lora")?;
        let second = resolve_selected_path(&registry, "loras", &selection, "lora_folder", "lora")?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_vae_empty_selection_defaults_to_pixel_space() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let registry = registry(&dir, &[("vae", "vae"), ("vae_approx", "vae_approx")]);

        for selection in [
            Selection::Nested(BTreeMap::new()),
            Selection::Flat("<none>".to_string()),
            Selection::nested([("vae_folder", "vae"), ("vae_name__vae", "<none>")]),
        ] {
            let source = resolve_vae_selection(&registry, &selection, "vae_folder", "vae_name")?;
            assert_eq!(source, VaeSource::Builtin(BuiltinVae::PixelSpace));
        }
        Ok(())
    }

    #[test]
    fn test_vae_builtin_selection() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let registry = registry(&dir, &[("vae", "vae"), ("vae_approx", "vae_approx")]);

        let selection =
            Selection::nested([("vae_folder", "builtins"), ("vae_name__builtins", "taesdxl")]);
        let source = resolve_vae_selection(&registry, &selection, "vae_folder", "vae_name")?;
        assert_eq!(source, VaeSource::Builtin(BuiltinVae::Taesdxl));

        let source = resolve_vae_selection(
            &registry,
            &Selection::Bare("taef1".to_string()),
            "vae_folder",
            "vae_name",
        )?;
        assert_eq!(source, VaeSource::Builtin(BuiltinVae::Taef1));

        let selection =
            Selection::nested([("vae_folder", "builtins"), ("vae_name__builtins", "taehv")]);
        let err = resolve_vae_selection(&registry, &selection, "vae_folder", "vae_name")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownBuiltinVae(_)));
        Ok(())
    }

    #[test]
    fn test_vae_file_selection() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let expected = touch(&dir, "vae/sdxl/sdxl_vae.safetensors")?;
        let approx = touch(&dir, "vae_approx/taesd_decoder.pth")?;
        let registry = registry(&dir, &[("vae", "vae"), ("vae_approx", "vae_approx")]);

        let selection = Selection::nested([
            ("vae_folder", "vae/sdxl"),
            ("vae_name__vae__sdxl", "sdxl/sdxl_vae.safetensors"),
        ]);
        let source = resolve_vae_selection(&registry, &selection, "vae_folder", "vae_name")?;
        assert_eq!(source, VaeSource::File(expected));

        // 文件夹选择框缺失时从文件下拉框的键名还原文件夹
        let selection = Selection::nested([("vae_name__vae_approx", "taesd_decoder.pth")]);
        let source = resolve_vae_selection(&registry, &selection, "vae_folder", "vae_name")?;
        assert_eq!(source, VaeSource::File(approx));

        let selection = Selection::nested([("vae_folder", "vae"), ("vae_name__vae", "gone.pt")]);
        let err = resolve_vae_selection(&registry, &selection, "vae_folder", "vae_name")
            .unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
        Ok(())
    }
}
