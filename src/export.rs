//! 导出流程编排
//!
//! 顺序：
//! 1. 校验输入目录布局、读取数据库密钥（失败即终止，此时尚未产生任何输出）
//! 2. 创建输出目录，复制并解密数据库
//! 3. （未跳过附件时）读取附件密钥，逐个解密附件
//! 4. 构建并应用文件名映射，写出 `map.json`
//!
//! 单个附件的解密 / 重命名失败只记录并计数，不影响整体结果。

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto::key::CipherKey;
use crate::database::{DECRYPTED_DATABASE_FILE, DecryptedDatabase, decrypt_database};
use crate::error::ExportError;
use crate::folder::{decrypt_attachments, list_attachments};
use crate::progress::ProgressEvent;
use crate::reconcile::{FilenameMapping, MAP_FILE, Reconciler};
use crate::store::EncryptedStore;

/// 输出目录中附件所在的子目录
pub const ATTACHMENTS_OUTPUT_DIR: &str = "attachments";

/// 一次导出的配置
#[derive(Clone)]
pub struct ExportOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// App 口令；提供时优先于 `config.json` 中的密钥
    pub password: Option<Zeroizing<String>>,
    pub skip_attachments: bool,
}

impl fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOptions")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("password", &self.password.as_ref().map(|_| ".."))
            .field("skip_attachments", &self.skip_attachments)
            .finish()
    }
}

/// 附件阶段的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentReport {
    pub attempted: usize,
    pub decrypted: usize,
    pub failed: usize,
    pub remapped: usize,
    pub unmapped: usize,
    pub remap_failed: usize,
    /// 正文无法解析而跳过的消息数
    pub skipped_records: usize,
    pub map_path: PathBuf,
}

/// 一次导出的汇总，只用于报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub database_path: PathBuf,
    /// 跳过附件时为 `None`
    pub attachments: Option<AttachmentReport>,
}

/// 执行一次完整导出
pub fn run_export<F>(options: &ExportOptions, mut on_progress: F) -> Result<ExportReport, ExportError>
where
    F: FnMut(ProgressEvent),
{
    // ---------- 前置条件：全部满足后才写任何东西 ----------
    let store = EncryptedStore::open(&options.input)?;
    let config_key = store.database_key()?;
    let cipher_key = match &options.password {
        Some(password) => CipherKey::parse(password),
        None => config_key,
    };

    let attachments_dir = options.output.join(ATTACHMENTS_OUTPUT_DIR);
    if !options.skip_attachments {
        ensure_clean(&attachments_dir)?;
    }

    std::fs::create_dir_all(&options.output).map_err(|source| ExportError::OutputDir {
        path: options.output.clone(),
        source,
    })?;

    // ---------- 数据库 ----------
    let database_path = options.output.join(DECRYPTED_DATABASE_FILE);
    decrypt_database(
        &store.database_path(),
        &database_path,
        &cipher_key,
        options.password.is_some(),
    )?;
    drop(cipher_key);
    info!(path = %database_path.display(), "decrypted database");
    on_progress(ProgressEvent::DatabaseDecrypted {
        path: database_path.clone(),
    });

    if options.skip_attachments {
        return Ok(ExportReport {
            database_path,
            attachments: None,
        });
    }

    // ---------- 附件 ----------
    let db = DecryptedDatabase::open(&database_path)?;
    let attachment_key = db.attachment_key()?;

    std::fs::create_dir_all(&attachments_dir).map_err(|source| ExportError::OutputDir {
        path: attachments_dir.clone(),
        source,
    })?;

    let (files, walk_failures) = list_attachments(&store.attachments_dir());
    on_progress(ProgressEvent::AttachmentsFound { total: files.len() });

    let batch = decrypt_attachments(&attachment_key, &files, &attachments_dir, &mut on_progress);
    drop(attachment_key);

    let failed = batch.failures.len() + walk_failures.len();
    info!(decrypted = batch.decrypted.len(), failed, "decrypted attachments");
    on_progress(ProgressEvent::AttachmentsDecrypted {
        decrypted: batch.decrypted.len(),
        failed,
    });

    // ---------- 文件名还原 ----------
    let mapping = FilenameMapping::from_database(&db)?;
    if mapping.is_empty() && !batch.decrypted.is_empty() {
        warn!("database records no attachment names, files keep their opaque names");
    }
    on_progress(ProgressEvent::RemapStarted {
        known_names: mapping.len(),
    });

    let mut reconciler = Reconciler::new(&mapping, batch.decrypted.iter().cloned());
    let mut remapped = 0;
    let mut unmapped = 0;
    let mut remap_failed = 0;

    for opaque_id in &batch.decrypted {
        match reconciler.remap(&attachments_dir, opaque_id) {
            Ok(Some(_)) => remapped += 1,
            Ok(None) => unmapped += 1,
            Err(err) => {
                warn!(error = %err, "failed to restore attachment name");
                remap_failed += 1;
            }
        }
    }

    reconciler.write_map(&attachments_dir)?;
    info!(remapped, unmapped, remap_failed, "remapped attachment names");
    on_progress(ProgressEvent::RemapFinished {
        remapped,
        unmapped,
        failed: remap_failed,
    });

    Ok(ExportReport {
        database_path,
        attachments: Some(AttachmentReport {
            attempted: batch.attempted() + walk_failures.len(),
            decrypted: batch.decrypted.len(),
            failed,
            remapped,
            unmapped,
            remap_failed,
            skipped_records: mapping.skipped_records(),
            map_path: attachments_dir.join(MAP_FILE),
        }),
    })
}

/// 附件输出目录必须不存在或为空，避免对上次的结果再次解密 / 改名
fn ensure_clean(dir: &Path) -> Result<(), ExportError> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                Err(ExportError::OutputNotClean(dir.to_path_buf()))
            } else {
                Ok(())
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ExportError::OutputDir {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}
