//! LoRA 加载

use std::path::Path;

use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_LOADER,
    error::Error,
    loader::file_input::{file_combo, resolve_file},
    wrapper::{
        comfy::sd::ComfySd,
        comfyui::{
            node_input::float_input,
            types::{NODE_CLIP, NODE_MODEL},
            PromptServer,
        },
    },
};

pub(crate) const LORA_FOLDER: &str = "loras";
const LORA_ID: &str = "lora";

/// 强度范围
pub(crate) const STRENGTH_MIN: f64 = -100.0;
pub(crate) const STRENGTH_MAX: f64 = 100.0;
pub(crate) const STRENGTH_STEP: f64 = 0.01;

/// 两个强度都为 0 时不需要加载 LoRA
pub fn is_noop(strength_model: f64, strength_clip: f64) -> bool {
    strength_model == 0.0 && strength_clip == 0.0
}

/// 加载 LoRA 文件并合并到模型与 CLIP
pub(crate) fn merge_lora<'py>(
    py: Python<'py>,
    model: &Bound<'py, PyAny>,
    clip: &Bound<'py, PyAny>,
    lora_path: &Path,
    strength_model: f64,
    strength_clip: f64,
) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
    let comfy = ComfySd::new(py)?;
    let lora = comfy.load_torch_file(lora_path, true)?;
    comfy.load_lora_for_models(model, clip, &lora, strength_model, strength_clip)
}

/// 解析选择值并应用 LoRA
fn apply_lora<'py>(
    py: Python<'py>,
    model: Bound<'py, PyAny>,
    clip: Bound<'py, PyAny>,
    lora: &Bound<'py, PyAny>,
    strength_model: f64,
    strength_clip: f64,
) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
    if is_noop(strength_model, strength_clip) {
        return Ok((model, clip));
    }

    let lora_path = resolve_file(py, LORA_FOLDER, LORA_ID, lora)?;
    merge_lora(py, &model, &clip, &lora_path, strength_model, strength_clip)
}

/// LoRA 加载
#[pyclass(subclass)]
pub struct LoraLoader {}

impl PromptServer for LoraLoader {}

#[pymethods]
impl LoraLoader {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_MODEL, NODE_CLIP)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("MODEL", "CLIP")
    }

    #[classattr]
    #[pyo3(name = "OUTPUT_TOOLTIPS")]
    fn output_tooltips() -> (&'static str, &'static str) {
        ("The modified diffusion model.", "The modified CLIP model.")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_LOADER;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "LoRAs are used to modify diffusion and CLIP models, altering the way in which latents are denoised such as applying styles. Multiple LoRA nodes can be linked together."
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
                required.set_item(
                    "model",
                    (NODE_MODEL, {
                        let model = PyDict::new(py);
                        model.set_item("tooltip", "The diffusion model the LoRA will be applied to.")?;
                        model
                    }),
                )?;
                required.set_item(
                    "clip",
                    (NODE_CLIP, {
                        let clip = PyDict::new(py);
                        clip.set_item("tooltip", "The CLIP model the LoRA will be applied to.")?;
                        clip
                    }),
                )?;

                Self::set_lora_inputs(py, &required)
                    .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;

                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        model: Bound<'py, PyAny>,
        clip: Bound<'py, PyAny>,
        lora: Bound<'py, PyAny>,
        strength_model: f64,
        strength_clip: f64,
    ) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>)> {
        apply_lora(py, model, clip, &lora, strength_model, strength_clip)
            .map_err(|e| self.raise_error(py, e))
    }
}

impl LoraLoader {
    fn set_lora_inputs(py: Python<'_>, required: &Bound<'_, PyDict>) -> Result<(), Error> {
        required.set_item(
            LORA_ID,
            file_combo(py, LORA_FOLDER, LORA_ID, "The name of the LoRA.")?,
        )?;
        required.set_item(
            "strength_model",
            float_input(
                py,
                1.0,
                STRENGTH_MIN,
                STRENGTH_MAX,
                STRENGTH_STEP,
                "How strongly to modify the diffusion model. This value can be negative.",
            )?,
        )?;
        required.set_item(
            "strength_clip",
            float_input(
                py,
                1.0,
                STRENGTH_MIN,
                STRENGTH_MAX,
                STRENGTH_STEP,
                "How strongly to modify the CLIP model. This value can be negative.",
            )?,
        )?;
        Ok(())
    }
}

/// LoRA 加载(仅模型)
#[pyclass(subclass)]
pub struct LoraLoaderModelOnly {}

impl PromptServer for LoraLoaderModelOnly {}

#[pymethods]
impl LoraLoaderModelOnly {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_MODEL,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("MODEL",)
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
                required.set_item("model", (NODE_MODEL,))?;

                let lora = file_combo(py, LORA_FOLDER, LORA_ID, "Select file")
                    .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;
                required.set_item(LORA_ID, lora)?;

                let strength_model =
                    float_input(py, 1.0, STRENGTH_MIN, STRENGTH_MAX, STRENGTH_STEP, "")
                        .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;
                required.set_item("strength_model", strength_model)?;

                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        model: Bound<'py, PyAny>,
        lora: Bound<'py, PyAny>,
        strength_model: f64,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        let clip = py.None().into_bound(py);
        apply_lora(py, model, clip, &lora, strength_model, 0.0)
            .map(|(model, _)| (model,))
            .map_err(|e| self.raise_error(py, e))
    }
}
