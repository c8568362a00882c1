//! 检查点加载
//!
//! 与 ComfyUI 内置的 CheckpointLoader/CheckpointLoaderSimple/unCLIPCheckpointLoader 相同,
//! 区别在于模型选择使用带目录树的下拉框

use std::path::PathBuf;

use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTuple, PyTupleMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};

use crate::{
    core::category::{CATEGORY_LOADER, CATEGORY_LOADER_ADVANCED},
    error::Error,
    loader::file_input::{file_combo, resolve_file},
    wrapper::{
        comfy::{
            folder_paths::{ComfyFolderPaths, FolderRegistry},
            sd::ComfySd,
        },
        comfyui::{
            types::{NODE_CLIP, NODE_CLIP_VISION, NODE_MODEL, NODE_VAE},
            PromptServer,
        },
    },
};

const CKPT_ID: &str = "ckpt";
const CKPT_FOLDER: &str = "checkpoints";

/// 文本嵌入目录
fn embedding_directory(py: Python<'_>) -> Result<Vec<PathBuf>, Error> {
    ComfyFolderPaths::new(py)?.get_folder_paths("embeddings")
}

/// 检查点加载(模型配置文件)
#[pyclass(subclass)]
pub struct CheckpointLoader {}

impl PromptServer for CheckpointLoader {}

#[pymethods]
impl CheckpointLoader {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str) {
        (NODE_MODEL, NODE_CLIP, NODE_VAE)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str) {
        ("MODEL", "CLIP", "VAE")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_LOADER_ADVANCED;

    // 过时标记
    #[classattr]
    #[pyo3(name = "DEPRECATED")]
    fn deprecated() -> bool {
        true
    }

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Loads a checkpoint with an explicit model config file."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);

                let configs = ComfyFolderPaths::new(py)
                    .and_then(|f| f.get_filename_list("configs"))
                    .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;
                required.set_item("config_name", (configs,))?;

                let ckpt = file_combo(py, CKPT_FOLDER, CKPT_ID, "Select file")
                    .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;
                required.set_item(CKPT_ID, ckpt)?;

                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        config_name: &str,
        ckpt: Bound<'py, PyAny>,
    ) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>, Bound<'py, PyAny>)> {
        self.load_checkpoint(py, config_name, &ckpt)
            .map_err(|e| self.raise_error(py, e))
    }
}

impl CheckpointLoader {
    fn load_checkpoint<'py>(
        &self,
        py: Python<'py>,
        config_name: &str,
        ckpt: &Bound<'py, PyAny>,
    ) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
        let config_path =
            ComfyFolderPaths::new(py)?.get_full_path_or_raise("configs", config_name)?;
        let ckpt_path = resolve_file(py, CKPT_FOLDER, CKPT_ID, ckpt)?;

        let out = ComfySd::new(py)?.load_checkpoint(
            &config_path,
            &ckpt_path,
            &embedding_directory(py)?,
        )?;
        Ok((out.get_item(0)?, out.get_item(1)?, out.get_item(2)?))
    }
}

/// 检查点加载
#[pyclass(subclass)]
pub struct CheckpointLoaderSimple {}

impl PromptServer for CheckpointLoaderSimple {}

#[pymethods]
impl CheckpointLoaderSimple {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str) {
        (NODE_MODEL, NODE_CLIP, NODE_VAE)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str) {
        ("MODEL", "CLIP", "VAE")
    }

    #[classattr]
    #[pyo3(name = "OUTPUT_TOOLTIPS")]
    fn output_tooltips() -> (&'static str, &'static str, &'static str) {
        (
            "The model used for denoising latents.",
            "The CLIP model used for encoding text prompts.",
            "The VAE model used for encoding and decoding images to and from latent space.",
        )
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_LOADER;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Loads a diffusion model checkpoint, diffusion models are used to denoise latents."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                let ckpt = file_combo(py, CKPT_FOLDER, CKPT_ID, "The checkpoint (model) to load.")
                    .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;
                required.set_item(CKPT_ID, ckpt)?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        ckpt: Bound<'py, PyAny>,
    ) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>, Bound<'py, PyAny>)> {
        self.load_checkpoint(py, &ckpt)
            .map_err(|e| self.raise_error(py, e))
    }
}

impl CheckpointLoaderSimple {
    fn load_checkpoint<'py>(
        &self,
        py: Python<'py>,
        ckpt: &Bound<'py, PyAny>,
    ) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
        let ckpt_path = resolve_file(py, CKPT_FOLDER, CKPT_ID, ckpt)?;
        let out = ComfySd::new(py)?.load_checkpoint_guess_config(
            &ckpt_path,
            false,
            &embedding_directory(py)?,
        )?;
        Ok((out.get_item(0)?, out.get_item(1)?, out.get_item(2)?))
    }
}

/// unCLIP 检查点加载, 额外输出 CLIP Vision
#[pyclass(subclass)]
pub struct UnClipCheckpointLoader {}

impl PromptServer for UnClipCheckpointLoader {}

#[pymethods]
impl UnClipCheckpointLoader {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str, &'static str) {
        (NODE_MODEL, NODE_CLIP, NODE_VAE, NODE_CLIP_VISION)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str, &'static str) {
        ("MODEL", "CLIP", "VAE", "CLIP_VISION")
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
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                let ckpt = file_combo(py, CKPT_FOLDER, CKPT_ID, "Select file")
                    .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;
                required.set_item(CKPT_ID, ckpt)?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[allow(clippy::type_complexity)]
    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        ckpt: Bound<'py, PyAny>,
    ) -> PyResult<(
        Bound<'py, PyAny>,
        Bound<'py, PyAny>,
        Bound<'py, PyAny>,
        Bound<'py, PyAny>,
    )> {
        let results = self.load_checkpoint(py, &ckpt);

        match results {
            Ok(out) => Ok((
                out.get_item(0)?,
                out.get_item(1)?,
                out.get_item(2)?,
                out.get_item(3)?,
            )),
            Err(e) => Err(self.raise_error(py, e)),
        }
    }
}

impl UnClipCheckpointLoader {
    fn load_checkpoint<'py>(
        &self,
        py: Python<'py>,
        ckpt: &Bound<'py, PyAny>,
    ) -> Result<Bound<'py, PyTuple>, Error> {
        let ckpt_path = resolve_file(py, CKPT_FOLDER, CKPT_ID, ckpt)?;
        ComfySd::new(py)?.load_checkpoint_guess_config(&ckpt_path, true, &embedding_directory(py)?)
    }
}
