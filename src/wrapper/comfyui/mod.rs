//! ComfyUI 节点协议
pub mod node_input;
pub mod prompt_server;
pub mod types;

pub use prompt_server::PromptServer;
