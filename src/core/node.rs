//! 节点注册

use pyo3::{types::PyType, Bound};

/// (NODE_CLASS_MAPPINGS 中的节点名称, 节点类型, NODE_DISPLAY_NAME_MAPPINGS 中的显示名称)
pub struct NodeRegister<'py>(pub &'static str, pub Bound<'py, PyType>, pub &'static str);
