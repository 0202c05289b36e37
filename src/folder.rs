//! 附件目录的批量解密
//!
//! 设计要点：
//! - 输入布局固定为 `attachments.noindex/<子目录>/<不透明文件名>`，只遍历这一层
//! - 按文件名排序遍历，保证多次运行结果一致
//! - 跳过系统生成的杂项文件（`.DS_Store` 等）
//! - 输出目录是扁平的，文件名即不透明文件名
//! - 单个文件失败只记录，不中断其余文件

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::crypto::key::AttachmentKey;
use crate::decrypt::decrypt_attachment_file;
use crate::error::AttachmentError;
use crate::progress::{Milestones, ProgressEvent};

/// 操作系统在目录中留下的文件，不是附件
pub const OS_ARTIFACTS: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// 一个待解密的附件文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAttachment {
    pub path: PathBuf,
    pub opaque_id: String,
}

/// 一批附件的解密结果
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// 成功解密的不透明文件名，保持遍历顺序
    pub decrypted: Vec<String>,
    pub failures: Vec<AttachmentError>,
}

impl BatchOutcome {
    pub fn attempted(&self) -> usize {
        self.decrypted.len() + self.failures.len()
    }
}

fn is_os_artifact(name: &OsStr) -> bool {
    name.to_str().is_some_and(|n| OS_ARTIFACTS.contains(&n))
}

/// 列出附件目录下所有加密附件
///
/// 遍历中无法读取的子目录会记为失败，其余照常列出。
pub fn list_attachments(root: &Path) -> (Vec<EncryptedAttachment>, Vec<AttachmentError>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry: &DirEntry| !is_os_artifact(entry.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "could not read attachment directory entry");
                failures.push(AttachmentError::Walk(e.to_string()));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        match entry.file_name().to_str() {
            Some(name) => files.push(EncryptedAttachment {
                path: entry.path().to_path_buf(),
                opaque_id: name.to_owned(),
            }),
            None => {
                warn!(path = %entry.path().display(), "skipping attachment with non UTF-8 name");
                failures.push(AttachmentError::Walk(format!(
                    "non UTF-8 file name: {:?}",
                    entry.path()
                )));
            }
        }
    }

    (files, failures)
}

/// 逐个解密附件到 `output_dir`
pub fn decrypt_attachments<F>(
    key: &AttachmentKey,
    files: &[EncryptedAttachment],
    output_dir: &Path,
    mut on_progress: F,
) -> BatchOutcome
where
    F: FnMut(ProgressEvent),
{
    let mut outcome = BatchOutcome::default();
    let mut seen = HashSet::new();
    let mut milestones = Milestones::new(files.len());

    for (index, file) in files.iter().enumerate() {
        if !seen.insert(file.opaque_id.as_str()) {
            let err = AttachmentError::Duplicate {
                path: file.path.clone(),
            };
            warn!(error = %err, "skipping attachment");
            outcome.failures.push(err);
        } else {
            let target = output_dir.join(&file.opaque_id);
            match decrypt_attachment_file(key, &file.path, &target) {
                Ok(len) => {
                    debug!(id = %file.opaque_id, bytes = len, "attachment decrypted");
                    outcome.decrypted.push(file.opaque_id.clone());
                }
                Err(err) => {
                    warn!(error = %err, "failed to decrypt attachment");
                    outcome.failures.push(err);
                }
            }
        }

        if let Some(percent) = milestones.advance(index + 1) {
            on_progress(ProgressEvent::AttachmentsProgress {
                done: index + 1,
                total: files.len(),
                percent,
            });
        }
    }

    outcome
}
