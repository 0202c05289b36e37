//! 数据库解密与只读访问
//!
//! 解密流程：
//! 1. 把加密数据库原样复制到输出目录旁的临时文件（从不就地解密源文件）
//! 2. 对副本执行 `PRAGMA key`，并通过读取 `sqlite_master` 验证密钥
//! 3. 挂载一个空密钥数据库，`sqlcipher_export` 导出为明文
//! 4. 导出成功后 rename 到目标路径，删除加密副本
//!
//! 任一步失败时目标路径上不会留下任何文件。

pub mod records;

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use tracing::debug;

use crate::crypto::key::{AttachmentKey, CipherKey};
use crate::error::ExportError;
use crate::fs::atomic::{stage_atomic, tmp_path_for};

/// 输出目录中明文数据库的文件名
pub const DECRYPTED_DATABASE_FILE: &str = "db-unencrypted.sqlite";

/// `items` 表中保存附件密钥的保留行
pub const ATTACHMENT_KEY_ROW: &str = "local_attachment_encrypted_key";

/// 将加密数据库解密为 `target` 处的明文数据库
///
/// `password_supplied` 只影响错误信息：
/// 用户给了口令时提示口令可能错误，否则提示需要口令。
pub fn decrypt_database(
    source: &Path,
    target: &Path,
    key: &CipherKey,
    password_supplied: bool,
) -> Result<(), ExportError> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));

    stage_atomic(target, |plaintext_path| {
        // ---------- 复制加密副本 ----------
        let encrypted_copy = tmp_path_for(parent, "db-encrypted");
        std::fs::copy(source, &encrypted_copy)?;

        let result = export_plaintext(&encrypted_copy, plaintext_path, key, password_supplied);

        let _ = std::fs::remove_file(&encrypted_copy);
        result
    })?;

    // ---------- 验证明文数据库无需密钥即可读取 ----------
    let conn = Connection::open_with_flags(target, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let tables: i64 = conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))?;
    debug!(tables, path = %target.display(), "plaintext database verified");

    Ok(())
}

fn export_plaintext(
    encrypted_copy: &Path,
    plaintext_path: &Path,
    key: &CipherKey,
    password_supplied: bool,
) -> Result<(), ExportError> {
    let conn = Connection::open_with_flags(
        encrypted_copy,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    // PRAGMA key 必须是连接上执行的第一条语句
    if let Err(e) = conn.pragma_update(None, "key", key.pragma_value().as_str()) {
        if !e.to_string().contains("Execute returned results") {
            return Err(e.into());
        }
    }

    // 错误的密钥要到第一次读取页面时才会暴露
    let readable: Result<i64, rusqlite::Error> =
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0));
    if let Err(e) = readable {
        debug!(error = %e, raw_key = key.is_raw(), "database key rejected");
        return Err(ExportError::DatabaseDecrypt { password_supplied });
    }

    let plaintext = plaintext_path.to_str().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("output path is not valid UTF-8: {plaintext_path:?}"),
        )
    })?;

    conn.execute("ATTACH DATABASE ?1 AS plaintext KEY ''", [plaintext])?;
    conn.query_row("SELECT sqlcipher_export('plaintext')", [], |_| Ok(()))?;
    conn.execute("DETACH DATABASE plaintext", [])?;

    Ok(())
}

/// 已解密的数据库，只读
pub struct DecryptedDatabase {
    conn: Connection,
}

#[derive(Deserialize)]
struct ItemValue {
    value: String,
}

impl DecryptedDatabase {
    pub fn open(path: &Path) -> Result<Self, ExportError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// 读取附件密钥：`items` 表保留行中的 `{"value": "<hex>"}`
    pub fn attachment_key(&self) -> Result<AttachmentKey, ExportError> {
        let json: String = self
            .conn
            .query_row(
                "SELECT json FROM items WHERE id = ?1",
                [ATTACHMENT_KEY_ROW],
                |row| row.get(0),
            )
            .map_err(|e| ExportError::KeyMaterial(format!("{ATTACHMENT_KEY_ROW}: {e}")))?;

        let item: ItemValue = serde_json::from_str(&json)
            .map_err(|e| ExportError::KeyMaterial(format!("{ATTACHMENT_KEY_ROW}: {e}")))?;

        AttachmentKey::from_hex(&item.value)
            .map_err(|e| ExportError::KeyMaterial(format!("{ATTACHMENT_KEY_ROW}: {e}")))
    }

    /// 所有带附件消息的 JSON 正文，按 rowid 排序
    pub fn messages_with_attachments(&self) -> Result<Vec<String>, ExportError> {
        let mut stmt = self
            .conn
            .prepare("SELECT json FROM messages WHERE hasAttachments = 1 ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 设置了头像的会话：`(会话 id, 头像附件路径)`，按 rowid 排序
    pub fn conversation_avatars(&self) -> Result<Vec<(String, String)>, ExportError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, avatarInProfile FROM conversations \
             WHERE avatarInProfile IS NOT NULL ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
