use std::path::PathBuf;

use thiserror::Error;

/// 整个导出流程级别的错误。
///
/// 除 `DatabaseDecrypt` 外均为致命错误：出现后不再信任任何部分输出。
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("input directory {path:?} is not a Session data directory: missing {missing}")]
    InputLayout { path: PathBuf, missing: &'static str },

    #[error("could not create output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output directory {0:?} is not empty, refusing to decrypt over a previous export")]
    OutputNotClean(PathBuf),

    #[error("could not read config.json in input directory: {0}")]
    ConfigRead(String),

    #[error("{}", database_decrypt_message(*password_supplied))]
    DatabaseDecrypt { password_supplied: bool },

    #[error("could not read media encryption key from database: {0}")]
    KeyMaterial(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn database_decrypt_message(password_supplied: bool) -> &'static str {
    if password_supplied {
        "could not decrypt database, you have likely specified the wrong password with -p"
    } else {
        "could not decrypt database, please specify the app's password with -p"
    }
}

/// 单个附件 stream 的解密错误。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream header truncated: {0} bytes")]
    TruncatedHeader(usize),

    #[error("stream chunk truncated: {0} bytes")]
    TruncatedChunk(usize),

    #[error("authentication failed (tampered data or wrong key)")]
    Authentication,

    #[error("chunk carries tag {tag:#04x} instead of the final tag")]
    NotFinal { tag: u8 },
}

/// 单个附件文件的处理错误，只影响该文件。
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decrypt {path:?}: {source}")]
    Decrypt {
        path: PathBuf,
        #[source]
        source: StreamError,
    },

    #[error("could not write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} has the same name as an attachment already exported")]
    Duplicate { path: PathBuf },

    #[error("could not list attachments: {0}")]
    Walk(String),
}

/// 文件重命名（还原原始文件名）错误。
#[derive(Debug, Error)]
pub enum RemapError {
    #[error("could not rename {from:?} to {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
