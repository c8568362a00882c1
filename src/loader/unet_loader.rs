//! 扩散模型加载

use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    core::category::CATEGORY_LOADER_ADVANCED,
    error::Error,
    loader::file_input::{file_combo, resolve_file},
    wrapper::{
        comfy::sd::{torch_dtype, ComfySd},
        comfyui::{types::NODE_MODEL, PromptServer},
    },
};

const UNET_ID: &str = "unet";
const UNET_FOLDER: &str = "diffusion_models";

/// 权重数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
pub enum WeightDtype {
    /// 使用模型文件自身的数据类型
    #[strum(to_string = "default")]
    Default,
    #[strum(to_string = "fp8_e4m3fn")]
    Fp8E4m3fn,
    /// fp8_e4m3fn 并启用 fp8 矩阵乘优化
    #[strum(to_string = "fp8_e4m3fn_fast")]
    Fp8E4m3fnFast,
    #[strum(to_string = "fp8_e5m2")]
    Fp8E5m2,
}

impl WeightDtype {
    pub fn options() -> Vec<String> {
        Self::iter().map(|v| v.to_string()).collect()
    }

    pub fn parse(name: &str) -> Result<Self, Error> {
        name.parse::<Self>()
            .map_err(|e| Error::ParseEnumString(format!("weight_dtype {name}, {e}")))
    }

    /// torch 数据类型名称
    pub fn torch_dtype(&self) -> Option<&'static str> {
        match self {
            WeightDtype::Default => None,
            WeightDtype::Fp8E4m3fn | WeightDtype::Fp8E4m3fnFast => Some("float8_e4m3fn"),
            WeightDtype::Fp8E5m2 => Some("float8_e5m2"),
        }
    }

    pub fn fp8_optimizations(&self) -> bool {
        matches!(self, WeightDtype::Fp8E4m3fnFast)
    }
}

/// 扩散模型加载
#[pyclass(subclass)]
pub struct UnetLoader {}

impl PromptServer for UnetLoader {}

#[pymethods]
impl UnetLoader {
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
    const CATEGORY: &'static str = CATEGORY_LOADER_ADVANCED;

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

                let unet = file_combo(py, UNET_FOLDER, UNET_ID, "Select file")
                    .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;
                required.set_item(UNET_ID, unet)?;

                required.set_item(
                    "weight_dtype",
                    (WeightDtype::options(), {
                        let weight_dtype = PyDict::new(py);
                        weight_dtype.set_item("default", WeightDtype::Default.to_string())?;
                        weight_dtype
                    }),
                )?;

                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        unet: Bound<'py, PyAny>,
        weight_dtype: &str,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        self.load_unet(py, &unet, weight_dtype)
            .map(|model| (model,))
            .map_err(|e| self.raise_error(py, e))
    }
}

impl UnetLoader {
    fn load_unet<'py>(
        &self,
        py: Python<'py>,
        unet: &Bound<'py, PyAny>,
        weight_dtype: &str,
    ) -> Result<Bound<'py, PyAny>, Error> {
        let weight_dtype = WeightDtype::parse(weight_dtype)?;

        let model_options = PyDict::new(py);
        if let Some(dtype) = weight_dtype.torch_dtype() {
            model_options.set_item("dtype", torch_dtype(py, dtype)?)?;
        }
        if weight_dtype.fp8_optimizations() {
            model_options.set_item("fp8_optimizations", true)?;
        }

        let unet_path = resolve_file(py, UNET_FOLDER, UNET_ID, unet)?;
        ComfySd::new(py)?.load_diffusion_model(&unet_path, &model_options)
    }
}
