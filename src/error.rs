//! 错误处理

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("strum error, {0}")]
    ParseEnumString(String),

    #[error("py error, {0}")]
    PyErr(#[from] pyo3::PyErr),
    #[error("pythonize error, {0}")]
    PythonizeError(#[from] pythonize::PythonizeError),
    #[error("py missing kwargs, {0}")]
    PyMissingKwargs(String),

    #[error("invalid directory, {0}")]
    InvalidDirectory(String),

    /// 选择值既不是字符串也不是字典
    #[error("invalid selection, {0}")]
    InvalidSelection(String),
    /// 所有回退查找后仍未选择文件
    #[error("no file selected, {0}")]
    NoFileSelected(String),
    /// 相对路径在任何基础目录下都不存在
    #[error("could not resolve path for selection: {0}")]
    PathNotFound(String),
    #[error("unknown builtin vae, {0}")]
    UnknownBuiltinVae(String),
}

impl Error {
    /// 文件未找到类错误
    ///
    /// 多 LoRA 加载时跳过此类槽位, 其它错误照常返回
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoFileSelected(_) | Error::PathNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use pyo3::exceptions::PyRuntimeError;

    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(Error::NoFileSelected("lora_1".to_string()).is_not_found());
        assert!(Error::PathNotFound("foo/bar.safetensors".to_string()).is_not_found());

        assert!(!Error::InvalidSelection("lora_1".to_string()).is_not_found());
        assert!(!Error::UnknownBuiltinVae("taesd9".to_string()).is_not_found());
        assert!(!Error::from(PyRuntimeError::new_err("load failed")).is_not_found());
    }
}
