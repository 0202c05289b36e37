//! 单个附件文件的解密流程
//!
//! 解密流程（严格顺序）：
//! 1. 读取整个加密文件（附件只有一个 chunk，无法流式处理）
//! 2. 切出 header，初始化 pull 状态
//! 3. 校验并解密唯一的 chunk，要求 tag 为 FINAL
//! 4. 原子写出明文
//!
//! 注意：
//! - 任一步失败都只影响这一个文件，由调用方汇总
//! - 校验失败时不会创建输出文件

use std::path::Path;

use crate::crypto::key::AttachmentKey;
use crate::error::AttachmentError;
use crate::format::stream::open_attachment;
use crate::fs::atomic::write_bytes_atomic;

/// 解密一个附件文件，返回明文长度
pub fn decrypt_attachment_file(
    key: &AttachmentKey,
    input_path: &Path,
    output_path: &Path,
) -> Result<usize, AttachmentError> {
    // ---------- 读取密文 ----------
    let data = std::fs::read(input_path).map_err(|source| AttachmentError::Read {
        path: input_path.to_path_buf(),
        source,
    })?;

    // ---------- 认证 + 解密 ----------
    let plaintext = open_attachment(key, &data).map_err(|source| AttachmentError::Decrypt {
        path: input_path.to_path_buf(),
        source,
    })?;

    // ---------- 写出 ----------
    write_bytes_atomic(output_path, &plaintext).map_err(|source| AttachmentError::Write {
        path: output_path.to_path_buf(),
        source,
    })?;

    Ok(plaintext.len())
}
