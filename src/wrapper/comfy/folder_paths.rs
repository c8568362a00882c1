//! 文件夹路径
//!
//! 模型目录注册表: 文件夹类型 -> 一个或多个基础目录。
//! 每次调用都重新查询, 不做缓存, 目录内容可能在界面渲染与执行之间变化。

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use pyo3::{
    types::{PyAnyMethods, PyModule},
    Bound, Python,
};

use crate::error::Error;

/// 目录注册表
///
/// 只读, 按注册顺序返回基础目录
pub trait FolderRegistry {
    /// 获取文件夹类型的基础目录列表
    fn get_folder_paths(&self, folder_type: &str) -> Result<Vec<PathBuf>, Error>;
}

/// ComfyUI `folder_paths` 模块包装
///
/// 需要持有 GIL, 仅在节点调用期间使用
pub struct ComfyFolderPaths<'py> {
    module: Bound<'py, PyModule>,
}

impl<'py> ComfyFolderPaths<'py> {
    pub fn new(py: Python<'py>) -> Result<Self, Error> {
        let module = py.import("folder_paths")?;
        Ok(Self { module })
    }

    /// 获取文件名列表
    pub fn get_filename_list(&self, folder_name: &str) -> Result<Vec<String>, Error> {
        let files = self
            .module
            .call_method1("get_filename_list", (folder_name,))?
            .extract::<Vec<String>>()?;
        Ok(files)
    }

    /// 获取完整文件路径, 不存在时由 ComfyUI 抛出异常
    pub fn get_full_path_or_raise(
        &self,
        folder_name: &str,
        filename: &str,
    ) -> Result<PathBuf, Error> {
        let path = self
            .module
            .call_method1("get_full_path_or_raise", (folder_name, filename))?
            .extract::<String>()?;
        Ok(PathBuf::from(path))
    }
}

impl FolderRegistry for ComfyFolderPaths<'_> {
    fn get_folder_paths(&self, folder_type: &str) -> Result<Vec<PathBuf>, Error> {
        let paths = self
            .module
            .call_method1("get_folder_paths", (folder_type,))?
            .extract::<Vec<String>>()?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }
}

/// 进程内文件夹路径配置
///
/// 按 ComfyUI 默认的 models 目录布局初始化, 供测试与非 Python 调用方使用
#[derive(Debug, Clone)]
pub struct FolderPaths {
    /// 模型路径
    model_path: PathBuf,
    /// 文件夹名称和路径映射
    folder_names_and_paths: BTreeMap<String, Vec<PathBuf>>,
}

impl FolderPaths {
    /// 按默认布局创建, 模型目录为 `{base_directory}/models`
    pub fn from_base_directory(base_directory: impl AsRef<Path>) -> Self {
        let model_path = base_directory.as_ref().join("models");
        let folder_names_and_paths = Self::init_folder_names_and_paths(&model_path);

        Self {
            model_path,
            folder_names_and_paths,
        }
    }

    /// 创建一个空的注册表
    pub fn empty(base_directory: impl AsRef<Path>) -> Self {
        Self {
            model_path: base_directory.as_ref().join("models"),
            folder_names_and_paths: BTreeMap::new(),
        }
    }

    fn init_folder_names_and_paths(models_dir: &Path) -> BTreeMap<String, Vec<PathBuf>> {
        let defaults: [(&str, &[&str]); 8] = [
            ("checkpoints", &["checkpoints"]),
            ("configs", &["configs"]),
            ("loras", &["loras"]),
            ("vae", &["vae"]),
            ("vae_approx", &["vae_approx"]),
            ("text_encoders", &["text_encoders", "clip"]),
            ("diffusion_models", &["unet", "diffusion_models"]),
            ("embeddings", &["embeddings"]),
        ];

        defaults
            .iter()
            .map(|(name, dirs)| {
                let paths = dirs.iter().map(|d| models_dir.join(d)).collect();
                (name.to_string(), paths)
            })
            .collect()
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// 获取文件夹路径映射
    pub fn folder_names_and_paths(&self) -> &BTreeMap<String, Vec<PathBuf>> {
        &self.folder_names_and_paths
    }

    /// 旧文件夹名称映射
    pub fn map_legacy(folder_name: &str) -> &str {
        match folder_name {
            "unet" => "diffusion_models",
            "clip" => "text_encoders",
            _ => folder_name,
        }
    }

    /// 添加模型文件夹路径
    ///
    /// # 参数
    /// * `folder_name` - 文件夹名称
    /// * `full_folder_path` - 完整的文件夹路径
    /// * `is_default` - 是否设为默认路径（放在列表首位）
    pub fn add_model_folder_path(
        &mut self,
        folder_name: &str,
        full_folder_path: PathBuf,
        is_default: bool,
    ) {
        let folder_name = Self::map_legacy(folder_name).to_string();
        let paths = self.folder_names_and_paths.entry(folder_name).or_default();

        // 已存在时只调整顺序
        if let Some(index) = paths.iter().position(|p| p == &full_folder_path) {
            if is_default && index != 0 {
                let path = paths.remove(index);
                paths.insert(0, path);
            }
            return;
        }

        if is_default {
            paths.insert(0, full_folder_path);
        } else {
            paths.push(full_folder_path);
        }
    }
}

impl FolderRegistry for FolderPaths {
    fn get_folder_paths(&self, folder_type: &str) -> Result<Vec<PathBuf>, Error> {
        let folder_type = Self::map_legacy(folder_type);
        self.folder_names_and_paths
            .get(folder_type)
            .cloned()
            .ok_or_else(|| Error::InvalidDirectory(format!("folder {folder_type} not found")))
    }
}
