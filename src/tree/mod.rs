//! 模型目录树
//!
//! 扫描模型目录, 生成层级选择菜单的数据, 并把前端提交的选择值解析回文件路径。
//! 不依赖 Python, 目录来源通过 `FolderRegistry` 注入。

pub mod builder;
pub mod builtins;
pub mod child_id;
pub mod encoder;
pub mod resolver;
pub mod scanner;
pub mod selection;
