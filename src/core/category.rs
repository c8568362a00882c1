//! 节点分类

/// 模型加载
pub const CATEGORY_LOADER: &str = "SK Loader";
/// 高级模型加载
pub const CATEGORY_LOADER_ADVANCED: &str = "SK Loader/Advanced";
