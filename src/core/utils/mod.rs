//! 工具
pub mod directory;
