//! ComfyUI 内部模块包装
pub mod folder_paths;
pub mod sd;
