//! 单 chunk 附件格式
//!
//! 附件文件布局：`header (24) || chunk`，整个文件只有一个 chunk，
//! 且该 chunk 必须携带 FINAL tag。
//!
//! FINAL tag 是完整性闸门而不只是格式约定：
//! 即使 MAC 校验通过，只要 tag 不是 FINAL，明文也视为不存在，不得写出。

use crate::crypto::key::AttachmentKey;
use crate::crypto::secretstream::{SecretStreamPull, SecretStreamPush, Tag};
use crate::error::StreamError;
use crate::format::header::StreamHeader;

/// 解密一个完整的附件文件内容
pub fn open_attachment(key: &AttachmentKey, data: &[u8]) -> Result<Vec<u8>, StreamError> {
    let (header, chunk) = StreamHeader::split(data)?;

    let mut stream = SecretStreamPull::init(key, &header.bytes);
    let (plaintext, tag) = stream.pull(chunk)?;

    if !tag.is_final() {
        return Err(StreamError::NotFinal { tag: tag.0 });
    }

    Ok(plaintext)
}

/// 以 App 相同的布局加密附件内容
pub fn seal_attachment(key: &AttachmentKey, plaintext: &[u8]) -> Vec<u8> {
    seal_attachment_with_tag(key, plaintext, Tag::FINAL)
}

/// 同 [`seal_attachment`]，但允许指定 tag。
pub fn seal_attachment_with_tag(key: &AttachmentKey, plaintext: &[u8], tag: Tag) -> Vec<u8> {
    let (mut stream, header) = SecretStreamPush::init(key);
    let chunk = stream.push(plaintext, tag);

    let mut out = Vec::with_capacity(header.len() + chunk.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&chunk);
    out
}
