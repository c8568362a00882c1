//! 内置 VAE
//!
//! 不从用户选择的文件加载, 而是由程序构造或使用随附权重的 VAE/近似解码器

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    error::Error,
    tree::{
        builder::{SelectionValue, TreeNode},
        child_id::encode_child_id,
    },
};

/// 内置 VAE 伪文件夹
pub const BUILTINS_FOLDER: &str = "builtins";

/// 内置 VAE
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
pub enum BuiltinVae {
    /// 像素空间, 不做编解码
    #[strum(to_string = "pixel_space")]
    PixelSpace,
    #[strum(to_string = "taesd")]
    Taesd,
    #[strum(to_string = "taesdxl")]
    Taesdxl,
    #[strum(to_string = "taesd3")]
    Taesd3,
    #[strum(to_string = "taef1")]
    Taef1,
}

impl BuiltinVae {
    /// 所有内置名称, 按下拉框顺序
    pub fn names() -> Vec<String> {
        Self::iter().map(|v| v.to_string()).collect()
    }

    /// 解析内置名称
    pub fn parse(name: &str) -> Result<Self, Error> {
        name.parse::<Self>()
            .map_err(|_| Error::UnknownBuiltinVae(name.to_string()))
    }

    /// TAESD 系列的潜空间缩放与偏移
    pub fn latent_scale_shift(&self) -> Option<(f64, f64)> {
        match self {
            BuiltinVae::PixelSpace => None,
            BuiltinVae::Taesd => Some((0.18215, 0.0)),
            BuiltinVae::Taesdxl => Some((0.13025, 0.0)),
            BuiltinVae::Taesd3 => Some((1.5305, 0.0609)),
            BuiltinVae::Taef1 => Some((0.3611, 0.1159)),
        }
    }
}

/// 内置 VAE 的树节点, 与文件树并列作为额外的顶层节点
pub fn builtins_tree(file_id: &str) -> TreeNode {
    let child_id = encode_child_id(file_id, BUILTINS_FOLDER);
    let children = BuiltinVae::iter()
        .map(|vae| {
            TreeNode::leaf(
                vae.to_string(),
                SelectionValue {
                    folder: BUILTINS_FOLDER.to_string(),
                    file: vae.to_string(),
                    child_id: child_id.clone(),
                },
            )
        })
        .collect();

    TreeNode {
        children,
        ..TreeNode::folder(BUILTINS_FOLDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        assert_eq!(
            BuiltinVae::names(),
            vec!["pixel_space", "taesd", "taesdxl", "taesd3", "taef1"]
        );
    }

    #[test]
    fn test_parse() -> anyhow::Result<()> {
        assert_eq!(BuiltinVae::parse("taesd3")?, BuiltinVae::Taesd3);
        assert_eq!(BuiltinVae::parse("pixel_space")?, BuiltinVae::PixelSpace);
        assert!(matches!(
            BuiltinVae::parse("taehv"),
            Err(Error::UnknownBuiltinVae(_))
        ));
        Ok(())
    }

    #[test]
    fn test_latent_scale_shift() {
        assert_eq!(BuiltinVae::PixelSpace.latent_scale_shift(), None);
        assert_eq!(BuiltinVae::Taef1.latent_scale_shift(), Some((0.3611, 0.1159)));
    }

    #[test]
    fn test_builtins_tree() {
        let node = builtins_tree("vae_name");
        assert_eq!(node.label, "builtins");
        let leaves = node.leaves();
        assert_eq!(leaves.len(), 5);
        assert!(leaves.iter().all(|v| v.child_id == "vae_name__builtins"));
        assert_eq!(leaves[0].file, "pixel_space");
    }
}
