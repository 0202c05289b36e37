//! 密码学原语：密钥材料与附件使用的 secret stream。

pub mod key;
pub mod secretstream;

pub use key::{AttachmentKey, CipherKey};
pub use secretstream::{SecretStreamPull, SecretStreamPush, Tag};
