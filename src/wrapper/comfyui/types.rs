//! 类型定义
//! 相关节点定义: ComfyUI/comfy/comfy_types/node_typing.py

pub const NODE_FLOAT: &str = "FLOAT";
pub const NODE_BOOLEAN: &str = "BOOLEAN";
pub const NODE_MODEL: &str = "MODEL";
pub const NODE_CLIP: &str = "CLIP";
pub const NODE_VAE: &str = "VAE";
pub const NODE_CLIP_VISION: &str = "CLIP_VISION";
