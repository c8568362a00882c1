//! 模型加载节点

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod file_input;

mod checkpoint_loader;
pub use checkpoint_loader::{CheckpointLoader, CheckpointLoaderSimple, UnClipCheckpointLoader};

mod unet_loader;
pub use unet_loader::{UnetLoader, WeightDtype};

mod lora_loader;
pub use lora_loader::{LoraLoader, LoraLoaderModelOnly};

mod power_lora_loader;
pub use power_lora_loader::{LoraSlot, PowerLoraLoader, NUM_SLOTS};

mod vae_loader;
pub use vae_loader::VaeLoader;

/// 加载模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "loader")?;
    submodule.add_class::<CheckpointLoader>()?;
    submodule.add_class::<CheckpointLoaderSimple>()?;
    submodule.add_class::<UnClipCheckpointLoader>()?;
    submodule.add_class::<UnetLoader>()?;
    submodule.add_class::<LoraLoader>()?;
    submodule.add_class::<LoraLoaderModelOnly>()?;
    submodule.add_class::<PowerLoraLoader>()?;
    submodule.add_class::<VaeLoader>()?;
    Ok(submodule)
}

/// loader node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "SK_CheckpointLoader",
            py.get_type::<CheckpointLoader>(),
            "[SK] Checkpoint (Config, Deprecated)",
        ),
        NodeRegister(
            "SK_CheckpointLoaderSimple",
            py.get_type::<CheckpointLoaderSimple>(),
            "[SK] Checkpoint",
        ),
        NodeRegister(
            "SK_unCLIPCheckpointLoader",
            py.get_type::<UnClipCheckpointLoader>(),
            "[SK] unCLIP Checkpoint",
        ),
        NodeRegister(
            "SK_UNETLoader",
            py.get_type::<UnetLoader>(),
            "[SK] Diffusion Model",
        ),
        NodeRegister("SK_LoraLoader", py.get_type::<LoraLoader>(), "[SK] LoRA"),
        NodeRegister(
            "SK_LoraLoaderModelOnly",
            py.get_type::<LoraLoaderModelOnly>(),
            "[SK] LoRA (Model Only)",
        ),
        NodeRegister(
            "SK_PowerLoraLoader",
            py.get_type::<PowerLoraLoader>(),
            "[SK] Power LoRA Loader",
        ),
        NodeRegister("SK_VAELoader", py.get_type::<VaeLoader>(), "[SK] VAE"),
    ];
    Ok(nodes)
}
