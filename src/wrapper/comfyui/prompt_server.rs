//! Prompt Server

use log::error;
use pyo3::{
    exceptions::PyRuntimeError,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyModule},
    PyErr, PyResult, PyTypeInfo, Python,
};

use crate::error::Error;

/// 前端监听的事件名称
const EVENT_NAME: &str = "sk_loader";

/// comfyui PromptServer wrapper
pub trait PromptServer: PyTypeInfo {
    /// 节点执行出现异常时通知前端
    fn send_error(&self, py: Python, error_type: &str, message: String) -> PyResult<()> {
        let server = PyModule::import(py, "server")?
            .getattr("PromptServer")?
            .getattr("instance")?;

        let error_data = PyDict::new(py);
        error_data.set_item("type", error_type)?;
        error_data.set_item("node", Self::get_class_name(py)?)?;
        error_data.set_item("message", message)?;

        server
            .getattr("send_sync")?
            .call1((EVENT_NAME, error_data))?;

        Ok(())
    }

    /// 记录并上报错误, 返回抛给 ComfyUI 的异常
    fn raise_error(&self, py: Python, err: Error) -> PyErr {
        let node = Self::get_class_name(py).unwrap_or_default();
        error!("{node} error, {err}");
        if let Err(e) = self.send_error(py, &node, err.to_string()) {
            error!("send error failed, {e}");
        }
        PyErr::new::<PyRuntimeError, _>(err.to_string())
    }

    /// Class 名称
    fn get_class_name(py: Python) -> PyResult<String> {
        Self::type_object(py)
            .getattr("__name__")?
            .extract::<String>()
    }
}
