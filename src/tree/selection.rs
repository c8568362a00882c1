//! 选择值
//!
//! 执行时前端提交的选择值有三种形态, 在边界处一次性判定:
//! - 裸相对路径字符串(API 提交的工作流、旧版工作流)
//! - 单个下拉框选中的字符串
//! - 输入名称 -> 选中值 的映射(文件夹选择框 + 各文件夹的文件下拉框)

use std::collections::BTreeMap;

use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods, PyString, PyTypeMethods},
    Bound, PyAny,
};
use serde_json::Value;

use crate::error::Error;

/// 无可选文件时的占位选项
pub const NONE_OPTION: &str = "<none>";

/// 是否为有效的选中值: 非空且不是占位选项
pub fn is_valid_value(value: &str) -> bool {
    !value.is_empty() && value != NONE_OPTION
}

/// 选择值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// 裸相对路径, 可以是存在的绝对路径
    Bare(String),
    /// 单个下拉框的选中值
    Flat(String),
    /// 输入名称 -> 选中值
    Nested(BTreeMap<String, String>),
}

impl Selection {
    /// 从 JSON 值解析
    ///
    /// 字符串视为裸路径; 对象只保留字符串类型的值
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Ok(Selection::Bare(s.clone())),
            Value::Object(map) => {
                let entries = map
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect();
                Ok(Selection::Nested(entries))
            }
            other => Err(Error::InvalidSelection(format!(
                "expected string or object, got {other}"
            ))),
        }
    }

    /// 从节点输入的 Python 对象解析
    ///
    /// 字符串来自下拉框; 字典只保留键和值都是字符串的项
    pub fn from_py(obj: &Bound<'_, PyAny>) -> Result<Self, Error> {
        if obj.is_instance_of::<PyString>() {
            return Ok(Selection::Flat(obj.extract::<String>()?));
        }
        if let Ok(dict) = obj.downcast::<PyDict>() {
            return Ok(Self::from_py_dict(dict));
        }

        let type_name = obj
            .get_type()
            .name()
            .map(|name| name.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Err(Error::InvalidSelection(format!(
            "expected str or dict, got {type_name}"
        )))
    }

    /// 从节点的关键字参数构造映射形态
    pub fn from_py_dict(dict: &Bound<'_, PyDict>) -> Self {
        let entries = dict
            .iter()
            .filter_map(|(k, v)| {
                let key = k.extract::<String>().ok()?;
                let value = v.extract::<String>().ok()?;
                Some((key, value))
            })
            .collect();
        Selection::Nested(entries)
    }

    /// 由键值对构造映射形态
    pub fn nested<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Selection::Nested(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_is_valid_value() {
        assert!(is_valid_value("a.safetensors"));
        assert!(!is_valid_value(""));
        assert!(!is_valid_value("<none>"));
    }

    #[test]
    fn test_from_value() -> anyhow::Result<()> {
        assert_eq!(
            Selection::from_value(&json!("foo/bar.pt"))?,
            Selection::Bare("foo/bar.pt".to_string())
        );
        assert_eq!(
            Selection::from_value(&json!({
                "ckpt": "foo",
                "ckpt__foo": "foo/bar.pt",
                "strength": 1.0
            }))?,
            Selection::nested([("ckpt", "foo"), ("ckpt__foo", "foo/bar.pt")])
        );
        assert!(matches!(
            Selection::from_value(&json!(42)),
            Err(Error::InvalidSelection(_))
        ));
        assert!(matches!(
            Selection::from_value(&json!(null)),
            Err(Error::InvalidSelection(_))
        ));
        Ok(())
    }
}
