//! 加密数据目录（只读输入）
//!
//! 目录布局固定：
//! - `sql/db.sqlite`：SQLCipher 加密的数据库
//! - `config.json`：`{"key": "<hex 或口令>"}`
//! - `attachments.noindex/<两位子目录>/<不透明文件名>`：加密附件

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;

use crate::crypto::key::CipherKey;
use crate::error::ExportError;

pub const DATABASE_FILE: &str = "sql/db.sqlite";
pub const CONFIG_FILE: &str = "config.json";
pub const ATTACHMENTS_DIR: &str = "attachments.noindex";

/// App 在各平台配置目录下使用的子目录名
const APP_DIR_NAME: &str = "Session";

/// 校验过布局的输入目录
#[derive(Debug, Clone)]
pub struct EncryptedStore {
    root: PathBuf,
}

#[derive(Deserialize)]
struct ConfigRecord {
    key: String,
}

impl EncryptedStore {
    /// 打开输入目录，缺少任一必需路径即失败
    pub fn open(root: &Path) -> Result<Self, ExportError> {
        if !root.is_dir() {
            return Err(ExportError::InputLayout {
                path: root.to_path_buf(),
                missing: "directory",
            });
        }

        for required in [DATABASE_FILE, CONFIG_FILE, ATTACHMENTS_DIR] {
            if !root.join(required).exists() {
                return Err(ExportError::InputLayout {
                    path: root.to_path_buf(),
                    missing: required,
                });
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join(ATTACHMENTS_DIR)
    }

    /// 从 `config.json` 读取数据库密钥
    pub fn database_key(&self) -> Result<CipherKey, ExportError> {
        let path = self.root.join(CONFIG_FILE);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ExportError::ConfigRead(format!("{}: {e}", path.display())))?;
        let record: ConfigRecord = serde_json::from_str(&raw)
            .map_err(|e| ExportError::ConfigRead(format!("{}: {e}", path.display())))?;

        Ok(CipherKey::parse(&record.key))
    }
}

/// 当前平台上 App 的默认数据目录
///
/// macOS 为 `~/Library/Application Support/Session`，
/// Linux 为 `$XDG_CONFIG_HOME/Session`（默认 `~/.config/Session`）。
pub fn default_data_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.config_dir().join(APP_DIR_NAME))
}
