//! 附件 stream header
//!
//! 加密附件的前 24 字节即 secretstream header，没有 magic 与版本号，
//! 只能按长度判断。header 不完整时必须拒绝继续处理。

use crate::crypto::secretstream::HEADER_BYTES;
use crate::error::StreamError;

/// secretstream header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub bytes: [u8; HEADER_BYTES],
}

impl StreamHeader {
    /// 从文件内容开头切出 header，返回 header 与剩余部分
    pub fn split(data: &[u8]) -> Result<(Self, &[u8]), StreamError> {
        if data.len() < HEADER_BYTES {
            return Err(StreamError::TruncatedHeader(data.len()));
        }

        let (head, rest) = data.split_at(HEADER_BYTES);
        let mut bytes = [0u8; HEADER_BYTES];
        bytes.copy_from_slice(head);

        Ok((Self { bytes }, rest))
    }
}
