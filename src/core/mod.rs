//! 公共库

pub mod category;
pub mod node;
pub mod utils;
