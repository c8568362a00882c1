//! 节点输入参数
//!
//! INPUT_TYPES 中的输入定义, 以及 execute 关键字参数的解析

use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods},
    Bound, PyAny, Python,
};
use serde::de::DeserializeOwned;

use crate::{
    error::Error,
    tree::{
        encoder::{ComboInput, FolderFileInputs, TREE_METADATA_KEY},
        selection::Selection,
    },
    wrapper::comfyui::types::{NODE_BOOLEAN, NODE_FLOAT},
};

/// 下拉框输入 `(options, {tooltip, default, sk_tree})`
pub fn combo_input<'py>(
    py: Python<'py>,
    combo: &ComboInput,
) -> Result<(Vec<String>, Bound<'py, PyDict>), Error> {
    let params = PyDict::new(py);
    params.set_item("default", combo.default_option())?;
    if !combo.tooltip.is_empty() {
        params.set_item("tooltip", &combo.tooltip)?;
    }
    if let Some(tree) = &combo.tree {
        params.set_item(TREE_METADATA_KEY, pythonize::pythonize(py, tree)?)?;
    }
    Ok((combo.options.clone(), params))
}

/// 两级输入: 文件夹选择框放在 required, 各文件夹的文件下拉框放在 optional
pub fn set_folder_file_inputs(
    py: Python<'_>,
    required: &Bound<'_, PyDict>,
    optional: &Bound<'_, PyDict>,
    inputs: &FolderFileInputs,
) -> Result<(), Error> {
    required.set_item(&inputs.folder.id, combo_input(py, &inputs.folder)?)?;
    for file in &inputs.files {
        optional.set_item(&file.id, combo_input(py, file)?)?;
    }
    Ok(())
}

/// 浮点输入
pub fn float_input<'py>(
    py: Python<'py>,
    default: f64,
    min: f64,
    max: f64,
    step: f64,
    tooltip: &str,
) -> Result<(&'static str, Bound<'py, PyDict>), Error> {
    let params = PyDict::new(py);
    params.set_item("default", default)?;
    params.set_item("min", min)?;
    params.set_item("max", max)?;
    params.set_item("step", step)?;
    if !tooltip.is_empty() {
        params.set_item("tooltip", tooltip)?;
    }
    Ok((NODE_FLOAT, params))
}

/// 布尔输入
pub fn boolean_input<'py>(
    py: Python<'py>,
    default: bool,
    tooltip: &str,
) -> Result<(&'static str, Bound<'py, PyDict>), Error> {
    let params = PyDict::new(py);
    params.set_item("default", default)?;
    params.set_item("tooltip", tooltip)?;
    Ok((NODE_BOOLEAN, params))
}

/// execute 关键字参数
pub struct InputKwargs<'py> {
    kwargs: Option<Bound<'py, PyDict>>,
}

impl<'py> InputKwargs<'py> {
    pub fn new(kwargs: Option<&Bound<'py, PyDict>>) -> Self {
        Self {
            kwargs: kwargs.cloned(),
        }
    }

    /// 获取原始参数, 不存在或为 None 时返回 None
    pub fn get(&self, key: &str) -> Result<Option<Bound<'py, PyAny>>, Error> {
        let Some(kwargs) = &self.kwargs else {
            return Ok(None);
        };
        Ok(kwargs.get_item(key)?.filter(|v| !v.is_none()))
    }

    /// 从 python kwargs 解析输入参数
    pub fn parse<T>(&self, key: &str) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let value_obj = self.get(key)?.ok_or(Error::PyMissingKwargs(format!(
            "the {key} parameter does not exist"
        )))?;

        let value: T = pythonize::depythonize(&value_obj)?;
        Ok(value)
    }

    /// 解析输入参数, 不存在时使用默认值
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        match self.get(key)? {
            Some(value_obj) => Ok(pythonize::depythonize(&value_obj)?),
            None => Ok(default),
        }
    }

    /// 单个输入的选择值, 不存在时返回 None
    pub fn selection(&self, key: &str) -> Result<Option<Selection>, Error> {
        self.get(key)?
            .map(|value| Selection::from_py(&value))
            .transpose()
    }

    /// 全部关键字参数组成的映射形态选择值
    pub fn nested_selection(&self) -> Selection {
        match &self.kwargs {
            Some(kwargs) => Selection::from_py_dict(kwargs),
            None => Selection::nested(Vec::<(String, String)>::new()),
        }
    }
}
