//! 集成测试共用的数据目录构造工具
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use session_export::{AttachmentKey, seal_attachment};

pub const DATABASE_KEY_HEX: &str =
    "2dd29ca851e7b56e4697b0e1f08507293d761a05ce4d1b628663f411a8086d99";
pub const ATTACHMENT_KEY_HEX: &str =
    "8f1b3a5c7e9d0b2a4c6e8f0a1b3c5d7e9f0a2b4c6d8e0f1a3b5c7d9e1f2a4b6c";

pub fn attachment_key() -> AttachmentKey {
    AttachmentKey::from_hex(ATTACHMENT_KEY_HEX).expect("fixture key")
}

/// 一个伪造的 App 数据目录
pub struct StoreBuilder {
    root: PathBuf,
    conn: Connection,
    next_message: usize,
}

impl StoreBuilder {
    /// 数据库使用 config.json 中的原始密钥加密
    pub fn new(root: &Path) -> Self {
        Self::with_key(root, &format!("x'{DATABASE_KEY_HEX}'"))
    }

    /// 数据库使用口令加密（模拟设置了 App 口令）
    pub fn with_password(root: &Path, password: &str) -> Self {
        Self::with_key(root, password)
    }

    fn with_key(root: &Path, key_pragma: &str) -> Self {
        fs::create_dir_all(root.join("sql")).expect("create sql dir");
        fs::create_dir_all(root.join("attachments.noindex")).expect("create attachments dir");
        fs::write(
            root.join("config.json"),
            format!(r#"{{"key":"{DATABASE_KEY_HEX}","opengroupPruning":true}}"#),
        )
        .expect("write config");

        let conn = Connection::open(root.join("sql/db.sqlite")).expect("open db");
        conn.pragma_update(None, "key", key_pragma).expect("key db");
        conn.execute_batch(
            "CREATE TABLE items (id TEXT PRIMARY KEY, json TEXT);
             CREATE TABLE conversations (
                 id TEXT PRIMARY KEY, active_at INTEGER, type TEXT, members TEXT,
                 displayNameInProfile TEXT, avatarInProfile TEXT, lastMessage TEXT
             );
             CREATE TABLE messages (
                 id TEXT PRIMARY KEY, json TEXT, sent_at INTEGER, conversationId TEXT,
                 source TEXT, type TEXT, hasAttachments INTEGER
             );
             CREATE TABLE openGroupRoomsV2 (serverUrl TEXT, roomId TEXT, conversationId TEXT);",
        )
        .expect("create schema");
        conn.execute(
            "INSERT INTO items (id, json) VALUES ('local_attachment_encrypted_key', ?1)",
            [format!(
                r#"{{"id":"local_attachment_encrypted_key","value":"{ATTACHMENT_KEY_HEX}"}}"#
            )],
        )
        .expect("insert attachment key");

        Self {
            root: root.to_path_buf(),
            conn,
            next_message: 0,
        }
    }

    /// 写入一个加密附件文件，返回其在 App 中的相对路径
    pub fn attachment(&mut self, opaque_id: &str, plaintext: &[u8]) -> String {
        let sub = &opaque_id[..2.min(opaque_id.len())];
        let dir = self.root.join("attachments.noindex").join(sub);
        fs::create_dir_all(&dir).expect("create attachment subdir");
        fs::write(dir.join(opaque_id), seal_attachment(&attachment_key(), plaintext))
            .expect("write attachment");
        format!("{sub}/{opaque_id}")
    }

    /// 写入一个无法解密的附件文件
    pub fn corrupt_attachment(&mut self, opaque_id: &str) -> String {
        let relative = self.attachment(opaque_id, b"will be damaged");
        let path = self.root.join("attachments.noindex").join(&relative);
        let mut bytes = fs::read(&path).expect("read attachment");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).expect("damage attachment");
        relative
    }

    /// 插入一条引用附件的消息
    pub fn message_with_attachment(&mut self, path: &str, file_name: &str) {
        let json = serde_json::json!({
            "body": "",
            "attachments": [{
                "path": path,
                "fileName": file_name,
                "contentType": "application/octet-stream",
            }],
        });
        self.insert_message(&json.to_string(), true);
    }

    pub fn insert_message(&mut self, json: &str, has_attachments: bool) {
        self.next_message += 1;
        self.conn
            .execute(
                "INSERT INTO messages (id, json, sent_at, conversationId, source, type, hasAttachments)
                 VALUES (?1, ?2, ?3, '05abc', '05abc', 'incoming', ?4)",
                params![
                    format!("m{}", self.next_message),
                    json,
                    self.next_message as i64,
                    has_attachments as i64
                ],
            )
            .expect("insert message");
    }

    pub fn conversation_avatar(&mut self, conversation_id: &str, avatar_path: &str) {
        self.conn
            .execute(
                "INSERT INTO conversations (id, type, avatarInProfile) VALUES (?1, 'group', ?2)",
                params![conversation_id, avatar_path],
            )
            .expect("insert conversation");
    }

    pub fn finish(self) -> PathBuf {
        drop(self.conn);
        self.root
    }
}

/// 列出目录中的文件名（排序）
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
