//! 多 LoRA 加载
//!
//! 固定数量的槽位, 按顺序依次应用。槽位未启用、强度均为 0 或文件找不到时跳过该槽位,
//! 不影响其它槽位。

use log::{debug, warn};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_LOADER,
    error::Error,
    loader::{
        file_input::file_combo,
        lora_loader::{is_noop, merge_lora, LORA_FOLDER, STRENGTH_MAX, STRENGTH_MIN, STRENGTH_STEP},
    },
    tree::{resolver::resolve_selected_path, selection::Selection},
    wrapper::{
        comfy::folder_paths::ComfyFolderPaths,
        comfyui::{
            node_input::{boolean_input, float_input, InputKwargs},
            types::{NODE_CLIP, NODE_MODEL},
            PromptServer,
        },
    },
};

/// 槽位数量
pub const NUM_SLOTS: usize = 5;

/// LoRA 槽位
#[derive(Debug, Clone, PartialEq)]
pub struct LoraSlot {
    /// 从 1 开始
    pub index: usize,
    pub enabled: bool,
    pub selection: Option<Selection>,
    pub strength_model: f64,
    pub strength_clip: f64,
}

impl LoraSlot {
    /// 槽位的文件输入名称, 同时作为文件夹输入名称
    pub fn input_id(index: usize) -> String {
        format!("lora_{index}")
    }

    fn from_kwargs(kwargs: &InputKwargs<'_>, index: usize) -> Result<Self, Error> {
        let id = Self::input_id(index);

        // 既不是字符串也不是字典的选择值视为未选择
        let selection = match kwargs.selection(&id) {
            Ok(selection) => selection,
            Err(Error::InvalidSelection(e)) => {
                warn!("{id} skipped, {e}");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            index,
            enabled: kwargs.parse_or(&format!("{id}_enabled"), false)?,
            selection,
            strength_model: kwargs.parse_or(&format!("{id}_strength_model"), 1.0)?,
            strength_clip: kwargs.parse_or(&format!("{id}_strength_clip"), 1.0)?,
        })
    }

    /// 是否需要应用
    pub fn is_active(&self) -> bool {
        self.enabled
            && self.selection.is_some()
            && !is_noop(self.strength_model, self.strength_clip)
    }
}

/// 多 LoRA 加载
#[pyclass(subclass)]
pub struct PowerLoraLoader {}

impl PromptServer for PowerLoraLoader {}

#[pymethods]
impl PowerLoraLoader {
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
        "Apply multiple LoRAs in order, each with enable toggles and strengths."
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
                        model.set_item("tooltip", "Diffusion model to apply multiple LoRAs onto.")?;
                        model
                    }),
                )?;

                for index in 1..=NUM_SLOTS {
                    Self::set_slot_inputs(py, &required, index)
                        .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))?;
                }
                required
            })?;
            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "clip",
                    (NODE_CLIP, {
                        let clip = PyDict::new(py);
                        clip.set_item("tooltip", "CLIP model to apply multiple LoRAs onto.")?;
                        clip
                    }),
                )?;
                optional
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute", signature = (model, clip = None, **kwargs))]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        model: Bound<'py, PyAny>,
        clip: Option<Bound<'py, PyAny>>,
        kwargs: Option<&Bound<'py, PyDict>>,
    ) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>)> {
        let kwargs = InputKwargs::new(kwargs);
        self.apply_slots(py, model, clip, &kwargs)
            .map_err(|e| self.raise_error(py, e))
    }
}

impl PowerLoraLoader {
    fn set_slot_inputs(
        py: Python<'_>,
        required: &Bound<'_, PyDict>,
        index: usize,
    ) -> Result<(), Error> {
        let id = LoraSlot::input_id(index);
        let label = format!("LoRA #{index}");

        required.set_item(
            format!("{id}_enabled"),
            boolean_input(py, false, &format!("Enable {label}"))?,
        )?;
        required.set_item(
            &id,
            file_combo(py, LORA_FOLDER, &id, &format!("Select {label}"))?,
        )?;
        required.set_item(
            format!("{id}_strength_model"),
            float_input(
                py,
                1.0,
                STRENGTH_MIN,
                STRENGTH_MAX,
                STRENGTH_STEP,
                &format!("{label} model strength"),
            )?,
        )?;
        required.set_item(
            format!("{id}_strength_clip"),
            float_input(
                py,
                1.0,
                STRENGTH_MIN,
                STRENGTH_MAX,
                STRENGTH_STEP,
                &format!("{label} CLIP strength"),
            )?,
        )?;
        Ok(())
    }

    fn apply_slots<'py>(
        &self,
        py: Python<'py>,
        model: Bound<'py, PyAny>,
        clip: Option<Bound<'py, PyAny>>,
        kwargs: &InputKwargs<'py>,
    ) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
        let folder_paths = ComfyFolderPaths::new(py)?;
        let has_clip = clip.is_some();
        let mut model = model;
        let mut clip = clip.unwrap_or_else(|| py.None().into_bound(py));

        for index in 1..=NUM_SLOTS {
            let slot = LoraSlot::from_kwargs(kwargs, index)?;
            let Some(selection) = slot.selection.as_ref().filter(|_| slot.is_active()) else {
                continue;
            };

            let id = LoraSlot::input_id(index);
            let lora_path =
                match resolve_selected_path(&folder_paths, LORA_FOLDER, selection, &id, &id) {
                    Ok(path) => path,
                    Err(e) if e.is_not_found() => {
                        warn!("{id} skipped, {e}");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
            debug!("apply {id}: {}", lora_path.display());

            let strength_clip = if has_clip { slot.strength_clip } else { 0.0 };
            (model, clip) = merge_lora(
                py,
                &model,
                &clip,
                &lora_path,
                slot.strength_model,
                strength_clip,
            )?;
        }

        Ok((model, clip))
    }
}
