//! 密钥材料
//!
//! - `CipherKey`：数据库密钥。64 位十六进制串按原始密钥处理，
//!   其余任意字符串按口令处理（交给 SQLCipher 的 KDF）。
//! - `AttachmentKey`：附件 secretstream 使用的 32 字节对称密钥。
//!
//! 两者都只在各自的解密阶段存活，离开作用域后清零，绝不写入输出目录。

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// secretstream 密钥长度
pub const KEY_LEN: usize = 32;

/// 原始数据库密钥的十六进制长度（32 字节）
const RAW_KEY_HEX_LEN: usize = 64;

/// 数据库密钥
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum CipherKey {
    /// 原始 256-bit 密钥，保存十六进制形式
    Raw(String),
    /// 口令，由 SQLCipher 派生实际密钥
    Passphrase(String),
}

impl CipherKey {
    /// 按形状区分原始密钥与口令。
    pub fn parse(value: &str) -> Self {
        if value.len() == RAW_KEY_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Self::Raw(value.to_owned())
        } else {
            Self::Passphrase(value.to_owned())
        }
    }

    /// `PRAGMA key` 接受的字符串值。
    ///
    /// 原始密钥写成 `x'…'`，SQLCipher 会跳过 KDF 直接使用。
    pub fn pragma_value(&self) -> Zeroizing<String> {
        match self {
            Self::Raw(hex) => Zeroizing::new(format!("x'{hex}'")),
            Self::Passphrase(passphrase) => Zeroizing::new(passphrase.clone()),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(_) => f.write_str("CipherKey::Raw(..)"),
            Self::Passphrase(_) => f.write_str("CipherKey::Passphrase(..)"),
        }
    }
}

/// 附件解密密钥
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AttachmentKey([u8; KEY_LEN]);

impl AttachmentKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// 从十六进制字符串解析，长度必须恰好为 32 字节。
    pub fn from_hex(value: &str) -> Result<Self, String> {
        let bytes = Zeroizing::new(
            hex::decode(value.trim()).map_err(|e| format!("key is not valid hex: {e}"))?,
        );
        let array: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("key must be {KEY_LEN} bytes, got {}", bytes.len()))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for AttachmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AttachmentKey(..)")
    }
}
