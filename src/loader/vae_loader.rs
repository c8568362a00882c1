//! VAE 加载
//!
//! 文件夹选择框包含内置 VAE 伪文件夹 `builtins` 以及 `vae`、`vae_approx` 下的各个目录,
//! 每个文件夹对应一个可选的文件下拉框。未选择任何文件时使用 `pixel_space`。

use log::debug;
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_LOADER,
    error::Error,
    tree::{
        builtins::BuiltinVae,
        encoder::vae_inputs,
        resolver::{resolve_vae_selection, VaeSource},
    },
    wrapper::{
        comfy::{
            folder_paths::ComfyFolderPaths,
            sd::{torch_scalar, ComfySd},
        },
        comfyui::{
            node_input::{set_folder_file_inputs, InputKwargs},
            types::NODE_VAE,
            PromptServer,
        },
    },
};

const VAE_FOLDER_ID: &str = "vae_folder";
const VAE_FILE_ID: &str = "vae_name";
const VAE_APPROX_FOLDER: &str = "vae_approx";

/// VAE 加载
#[pyclass(subclass)]
pub struct VaeLoader {}

impl PromptServer for VaeLoader {}

#[pymethods]
impl VaeLoader {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_VAE,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("VAE",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_LOADER;

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let required = PyDict::new(py);
            let optional = PyDict::new(py);
            Self::set_vae_inputs(py, &required, &optional)
                .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;

            let dict = PyDict::new(py);
            dict.set_item("required", required)?;
            dict.set_item("optional", optional)?;
            Ok(dict.into())
        })
    }

    /// 文件夹选择框与各文件下拉框都通过关键字参数传入
    #[pyo3(name = "execute", signature = (**kwargs))]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        kwargs: Option<&Bound<'py, PyDict>>,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        let kwargs = InputKwargs::new(kwargs);
        self.load_vae(py, &kwargs)
            .map(|vae| (vae,))
            .map_err(|e| self.raise_error(py, e))
    }
}

impl VaeLoader {
    fn set_vae_inputs(
        py: Python<'_>,
        required: &Bound<'_, PyDict>,
        optional: &Bound<'_, PyDict>,
    ) -> Result<(), Error> {
        let folder_paths = ComfyFolderPaths::new(py)?;
        let inputs = vae_inputs(&folder_paths, VAE_FOLDER_ID, VAE_FILE_ID, "Select VAE file")?;
        set_folder_file_inputs(py, required, optional, &inputs)
    }

    fn load_vae<'py>(
        &self,
        py: Python<'py>,
        kwargs: &InputKwargs<'py>,
    ) -> Result<Bound<'py, PyAny>, Error> {
        let folder_paths = ComfyFolderPaths::new(py)?;
        let comfy = ComfySd::new(py)?;

        let selection = kwargs.nested_selection();
        let source = resolve_vae_selection(&folder_paths, &selection, VAE_FOLDER_ID, VAE_FILE_ID)?;
        debug!("vae source: {source:?}");

        let sd = match source {
            VaeSource::Builtin(BuiltinVae::PixelSpace) => {
                let sd = PyDict::new(py);
                sd.set_item("pixel_space_vae", torch_scalar(py, 1.0)?)?;
                sd
            }
            VaeSource::Builtin(vae) => Self::load_taesd(py, &folder_paths, &comfy, vae)?,
            VaeSource::File(path) => comfy.load_torch_file(&path, false)?,
        };

        comfy.build_vae(&sd)
    }

    /// 由 `vae_approx` 中的编码器与解码器组装 TAESD 状态字典
    fn load_taesd<'py>(
        py: Python<'py>,
        folder_paths: &ComfyFolderPaths<'py>,
        comfy: &ComfySd<'py>,
        vae: BuiltinVae,
    ) -> Result<Bound<'py, PyDict>, Error> {
        let approx_vaes = folder_paths.get_filename_list(VAE_APPROX_FOLDER)?;
        let sd = PyDict::new(py);

        for part in ["encoder", "decoder"] {
            let prefix = format!("{vae}_{part}.");
            let filename = approx_vaes
                .iter()
                .find(|name| name.starts_with(&prefix))
                .ok_or_else(|| Error::PathNotFound(format!("{VAE_APPROX_FOLDER}/{prefix}*")))?;

            let path = folder_paths.get_full_path_or_raise(VAE_APPROX_FOLDER, filename)?;
            for (key, value) in comfy.load_torch_file(&path, false)?.iter() {
                let key = key.extract::<String>()?;
                sd.set_item(format!("taesd_{part}.{key}"), value)?;
            }
        }

        if let Some((scale, shift)) = vae.latent_scale_shift() {
            sd.set_item("vae_scale", torch_scalar(py, scale)?)?;
            sd.set_item("vae_shift", torch_scalar(py, shift)?)?;
        }
        Ok(sd)
    }
}
