//! 单下拉框文件输入
//!
//! 检查点、扩散模型与 LoRA 节点共用: 下拉框列出文件夹类型下的全部模型文件,
//! 执行时解析回基础目录下的实际路径

use std::path::PathBuf;

use pyo3::{types::PyDict, Bound, PyAny, Python};

use crate::{
    error::Error,
    tree::{encoder::flat_file_input, resolver::resolve_selected_path, selection::Selection},
    wrapper::{comfy::folder_paths::ComfyFolderPaths, comfyui::node_input::combo_input},
};

/// 输入定义
pub fn file_combo<'py>(
    py: Python<'py>,
    folder_type: &str,
    input_id: &str,
    tooltip: &str,
) -> Result<(Vec<String>, Bound<'py, PyDict>), Error> {
    let folder_paths = ComfyFolderPaths::new(py)?;
    let combo = flat_file_input(&folder_paths, folder_type, input_id, tooltip)?;
    combo_input(py, &combo)
}

/// 解析输入值为文件路径
///
/// 单下拉框节点的文件夹输入与文件输入是同一个
pub fn resolve_file(
    py: Python<'_>,
    folder_type: &str,
    input_id: &str,
    value: &Bound<'_, PyAny>,
) -> Result<PathBuf, Error> {
    let folder_paths = ComfyFolderPaths::new(py)?;
    let selection = Selection::from_py(value)?;
    resolve_selected_path(&folder_paths, folder_type, &selection, input_id, input_id)
}
