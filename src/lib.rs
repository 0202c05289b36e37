mod decrypt;

pub mod crypto;
pub mod database;
pub mod error;
pub mod export;
pub mod folder;
pub mod format;
pub mod fs;
pub mod progress;
pub mod reconcile;
pub mod store;

pub use crypto::{AttachmentKey, CipherKey};
pub use error::{AttachmentError, ExportError, RemapError, StreamError};
pub use export::{AttachmentReport, ExportOptions, ExportReport, run_export};
pub use format::stream::{open_attachment, seal_attachment};
pub use progress::ProgressEvent;
pub use reconcile::{format_conversation_id, sanitize_file_name};

use std::path::Path;

/// 解密单个附件文件，返回明文长度
pub fn decrypt_attachment(
    key: &AttachmentKey,
    input: &Path,
    output: &Path,
) -> Result<usize, AttachmentError> {
    decrypt::decrypt_attachment_file(key, input, output)
}
