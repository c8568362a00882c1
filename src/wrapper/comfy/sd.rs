//! comfy.sd / comfy.utils 包装
//!
//! 模型反序列化、LoRA 合并与 VAE 构造都由 ComfyUI 完成, 这里只负责参数组装

use std::path::{Path, PathBuf};

use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods, PyModule, PyTuple},
    Bound, PyAny, PyErr, Python,
};

use crate::error::Error;

/// 路径转换为 Python 字符串参数
fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// comfy.sd 与 comfy.utils
pub struct ComfySd<'py> {
    py: Python<'py>,
    sd: Bound<'py, PyModule>,
    utils: Bound<'py, PyModule>,
}

impl<'py> ComfySd<'py> {
    pub fn new(py: Python<'py>) -> Result<Self, Error> {
        Ok(Self {
            py,
            sd: py.import("comfy.sd")?,
            utils: py.import("comfy.utils")?,
        })
    }

    fn checkpoint_kwargs(
        &self,
        embedding_directory: &[PathBuf],
    ) -> Result<Bound<'py, PyDict>, Error> {
        let kwargs = PyDict::new(self.py);
        kwargs.set_item("output_vae", true)?;
        kwargs.set_item("output_clip", true)?;
        kwargs.set_item(
            "embedding_directory",
            embedding_directory
                .iter()
                .map(|p| path_arg(p))
                .collect::<Vec<String>>(),
        )?;
        Ok(kwargs)
    }

    /// 使用模型配置文件加载检查点, 返回 (MODEL, CLIP, VAE)
    pub fn load_checkpoint(
        &self,
        config_path: &Path,
        ckpt_path: &Path,
        embedding_directory: &[PathBuf],
    ) -> Result<Bound<'py, PyTuple>, Error> {
        let kwargs = self.checkpoint_kwargs(embedding_directory)?;
        let out = self.sd.call_method(
            "load_checkpoint",
            (path_arg(config_path), path_arg(ckpt_path)),
            Some(&kwargs),
        )?;
        Ok(out.downcast_into::<PyTuple>().map_err(PyErr::from)?)
    }

    /// 自动识别模型配置加载检查点, 返回 (MODEL, CLIP, VAE, CLIP_VISION)
    pub fn load_checkpoint_guess_config(
        &self,
        ckpt_path: &Path,
        output_clipvision: bool,
        embedding_directory: &[PathBuf],
    ) -> Result<Bound<'py, PyTuple>, Error> {
        let kwargs = self.checkpoint_kwargs(embedding_directory)?;
        if output_clipvision {
            kwargs.set_item("output_clipvision", true)?;
        }
        let out = self.sd.call_method(
            "load_checkpoint_guess_config",
            (path_arg(ckpt_path),),
            Some(&kwargs),
        )?;
        Ok(out.downcast_into::<PyTuple>().map_err(PyErr::from)?)
    }

    /// 加载扩散模型
    pub fn load_diffusion_model(
        &self,
        unet_path: &Path,
        model_options: &Bound<'py, PyDict>,
    ) -> Result<Bound<'py, PyAny>, Error> {
        let kwargs = PyDict::new(self.py);
        kwargs.set_item("model_options", model_options)?;
        let model = self
            .sd
            .call_method("load_diffusion_model", (path_arg(unet_path),), Some(&kwargs))?;
        Ok(model)
    }

    /// 加载权重文件为状态字典
    pub fn load_torch_file(&self, path: &Path, safe_load: bool) -> Result<Bound<'py, PyDict>, Error> {
        let kwargs = PyDict::new(self.py);
        kwargs.set_item("safe_load", safe_load)?;
        let sd = self
            .utils
            .call_method("load_torch_file", (path_arg(path),), Some(&kwargs))?;
        Ok(sd.downcast_into::<PyDict>().map_err(PyErr::from)?)
    }

    /// 将 LoRA 合并到模型与 CLIP, 返回新的 (MODEL, CLIP)
    ///
    /// `clip` 可以是 None
    pub fn load_lora_for_models(
        &self,
        model: &Bound<'py, PyAny>,
        clip: &Bound<'py, PyAny>,
        lora: &Bound<'py, PyDict>,
        strength_model: f64,
        strength_clip: f64,
    ) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
        let out = self.sd.call_method1(
            "load_lora_for_models",
            (model, clip, lora, strength_model, strength_clip),
        )?;
        Ok(out.extract::<(Bound<'py, PyAny>, Bound<'py, PyAny>)>()?)
    }

    /// 由状态字典构造 VAE 并校验
    pub fn build_vae(&self, sd: &Bound<'py, PyDict>) -> Result<Bound<'py, PyAny>, Error> {
        let kwargs = PyDict::new(self.py);
        kwargs.set_item("sd", sd)?;
        let vae = self.sd.getattr("VAE")?.call((), Some(&kwargs))?;
        vae.call_method0("throw_exception_if_invalid")?;
        Ok(vae)
    }
}

/// torch 标量张量
pub fn torch_scalar(py: Python<'_>, value: f64) -> Result<Bound<'_, PyAny>, Error> {
    let tensor = py.import("torch")?.call_method1("tensor", (value,))?;
    Ok(tensor)
}

/// torch 数据类型, 例如 `float8_e4m3fn`
pub fn torch_dtype<'py>(py: Python<'py>, name: &str) -> Result<Bound<'py, PyAny>, Error> {
    let dtype = py.import("torch")?.getattr(name)?;
    Ok(dtype)
}
