//! 文件名还原
//!
//! 解密后的附件以不透明文件名落盘。本模块分两步把它们改回原始文件名：
//!
//! 1. 构建：扫描消息中的附件 / 缩略图引用与会话头像，
//!    得到 `不透明文件名 -> 原始文件名` 的映射（构建后不再修改）
//! 2. 应用：逐个重命名已解密文件，清洗文件名并处理重名，
//!    最终映射写入 `map.json`，供后续阶段把消息解析到展示用文件名
//!
//! 设计要点：
//! - 重名计数器属于一次应用过程（`Reconciler`），没有全局状态
//! - 最终文件名在输出目录内唯一
//! - 没有映射的附件保持原名，不算错误

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use tracing::warn;
use url::Url;

use crate::database::DecryptedDatabase;
use crate::database::records::{AttachmentRef, MessageBody, opaque_basename};
use crate::error::{ExportError, RemapError};
use crate::fs::atomic::write_bytes_atomic;

/// 映射文件名，保留给本模块使用
pub const MAP_FILE: &str = "map.json";

const ESCAPED_MAP_FILE: &str = "_map.json";
const THUMBNAIL_PREFIX: &str = "thumb_";
const UNNAMED: &str = "unnamed";
const AVATAR_PREFIX: &str = "avatar_";
const AVATAR_EXTENSION: &str = ".jpeg";

/// 会话 id 规范化
///
/// 社区（URL 形式）id 变为 `host + path`，其中 `/` 替换为 `_`；
/// 其余 id 原样返回。凡是用会话 id 拼目录名 / 文件名的地方都必须经过这里。
pub fn format_conversation_id(id: &str) -> String {
    if !(id.starts_with("http://") || id.starts_with("https://")) {
        return id.to_owned();
    }

    match Url::parse(id) {
        Ok(url) => format!(
            "{}{}",
            url.host_str().unwrap_or_default(),
            url.path().replace('/', "_")
        ),
        Err(_) => id.to_owned(),
    }
}

/// 把 `[A-Za-z0-9._-]` 与西里尔字母之外的字符全部替换为 `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') || is_cyrillic(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}')
}

/// 在扩展名前插入 `_(n)`
fn with_collision_suffix(name: &str, n: usize) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_({n}){}", &name[..dot], &name[dot..]),
        _ => format!("{name}_({n})"),
    }
}

/// 一个不透明文件对应的原始文件名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalName {
    pub name: String,
    pub thumbnail: bool,
}

impl LogicalName {
    /// 加上缩略图前缀、处理空名与保留名之后的完整名字（尚未清洗）
    fn display_name(&self) -> String {
        let name = match self.name.as_str() {
            "" | "." | ".." => UNNAMED,
            MAP_FILE => ESCAPED_MAP_FILE,
            other => other,
        };
        if self.thumbnail {
            format!("{THUMBNAIL_PREFIX}{name}")
        } else {
            name.to_owned()
        }
    }
}

/// `不透明文件名 -> 原始文件名`
#[derive(Debug, Clone, Default)]
pub struct FilenameMapping {
    entries: HashMap<String, LogicalName>,
    skipped_records: usize,
}

impl FilenameMapping {
    /// 从已解密数据库构建映射
    ///
    /// 解析失败的消息会被跳过并计数。
    pub fn from_database(db: &DecryptedDatabase) -> Result<Self, ExportError> {
        let mut mapping = Self::default();

        for json in db.messages_with_attachments()? {
            match MessageBody::parse(&json) {
                Ok(message) => {
                    for attachment in message.attachments() {
                        mapping.insert_attachment(attachment);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "skipping message with malformed body");
                    mapping.skipped_records += 1;
                }
            }
        }

        for (conversation_id, avatar_path) in db.conversation_avatars()? {
            mapping.insert_avatar(&conversation_id, &avatar_path);
        }

        Ok(mapping)
    }

    /// 记录一个附件及其缩略图，后出现的引用覆盖先出现的
    pub fn insert_attachment(&mut self, attachment: &AttachmentRef) {
        let name = attachment.file_name.clone().unwrap_or_default();

        if let Some(path) = attachment.path.as_deref() {
            self.entries.insert(
                opaque_basename(path).to_owned(),
                LogicalName {
                    name: name.clone(),
                    thumbnail: false,
                },
            );
        }

        if let Some(path) = attachment.thumbnail.as_ref().and_then(|t| t.path.as_deref()) {
            self.entries.insert(
                opaque_basename(path).to_owned(),
                LogicalName {
                    name,
                    thumbnail: true,
                },
            );
        }
    }

    /// 记录会话头像：`avatar_<规范化会话 id>.jpeg`
    pub fn insert_avatar(&mut self, conversation_id: &str, avatar_path: &str) {
        self.entries.insert(
            opaque_basename(avatar_path).to_owned(),
            LogicalName {
                name: format!(
                    "{AVATAR_PREFIX}{}{AVATAR_EXTENSION}",
                    format_conversation_id(conversation_id)
                ),
                thumbnail: false,
            },
        );
    }

    pub fn get(&self, opaque_id: &str) -> Option<&LogicalName> {
        self.entries.get(opaque_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }
}

/// 一次重命名过程的上下文
///
/// 持有重名计数器与已占用文件名，只在本次过程内有效。
pub struct Reconciler<'a> {
    mapping: &'a FilenameMapping,
    /// 清洗后的名字 -> 已使用次数
    used: HashMap<String, usize>,
    /// 目录中已被占用的文件名（含尚未改名的不透明文件）
    taken: HashSet<String>,
    resolved: BTreeMap<String, String>,
}

impl<'a> Reconciler<'a> {
    /// `present` 为目录中所有已解密的不透明文件名
    pub fn new<I, S>(mapping: &'a FilenameMapping, present: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut taken: HashSet<String> = present.into_iter().map(Into::into).collect();
        taken.insert(MAP_FILE.to_owned());

        Self {
            mapping,
            used: HashMap::new(),
            taken,
            resolved: BTreeMap::new(),
        }
    }

    /// 计算下一个可用的最终文件名，不修改状态
    fn next_name(&self, opaque_id: &str, logical: &LogicalName) -> (String, String, usize) {
        let sanitized = sanitize_file_name(&logical.display_name());
        let mut n = self.used.get(&sanitized).copied().unwrap_or(0);

        loop {
            let candidate = if n == 0 {
                sanitized.clone()
            } else {
                with_collision_suffix(&sanitized, n)
            };
            if candidate == opaque_id || !self.taken.contains(&candidate) {
                return (sanitized, candidate, n);
            }
            n += 1;
        }
    }

    /// 把 `dir/opaque_id` 重命名为其原始文件名
    ///
    /// 返回最终文件名；没有映射时返回 `None` 并保持原样。
    pub fn remap(&mut self, dir: &Path, opaque_id: &str) -> Result<Option<String>, RemapError> {
        let Some(logical) = self.mapping.get(opaque_id) else {
            return Ok(None);
        };

        let (sanitized, final_name, n) = self.next_name(opaque_id, logical);

        if final_name != opaque_id {
            let from = dir.join(opaque_id);
            let to = dir.join(&final_name);
            std::fs::rename(&from, &to).map_err(|source| RemapError::Rename { from, to, source })?;
        }

        self.used.insert(sanitized, n + 1);
        self.taken.remove(opaque_id);
        self.taken.insert(final_name.clone());
        self.resolved.insert(opaque_id.to_owned(), final_name.clone());

        Ok(Some(final_name))
    }

    /// 把 `不透明文件名 -> 最终文件名` 以扁平 JSON 对象写入 `dir/map.json`
    pub fn write_map(&self, dir: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec(&self.resolved).map_err(std::io::Error::other)?;
        write_bytes_atomic(&dir.join(MAP_FILE), &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    use crate::database::records::ThumbnailRef;

    fn attachment(path: &str, name: &str) -> AttachmentRef {
        AttachmentRef {
            path: Some(path.to_owned()),
            file_name: Some(name.to_owned()),
            ..Default::default()
        }
    }

    /// 在 dir 中放好 ids 对应的文件并逐个 remap
    fn remap_all(mapping: &FilenameMapping, ids: &[&str]) -> (tempfile::TempDir, Vec<Option<String>>) {
        let dir = tempdir().unwrap();
        for id in ids {
            fs::write(dir.path().join(id), id.as_bytes()).unwrap();
        }

        let mut reconciler = Reconciler::new(mapping, ids.iter().copied());
        let names = ids
            .iter()
            .map(|id| reconciler.remap(dir.path(), id).expect("rename"))
            .collect();
        reconciler.write_map(dir.path()).unwrap();
        (dir, names)
    }

    #[test]
    fn conversation_id_formatting() {
        assert_eq!(
            format_conversation_id("https://host.example/room/abc"),
            "host.example_room_abc"
        );
        assert_eq!(
            format_conversation_id("http://open.getsession.org:8080/session"),
            "open.getsession.org_session"
        );
        let account = "05deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
        assert_eq!(format_conversation_id(account), account);
    }

    #[test]
    fn sanitizes_disallowed_characters() {
        assert_eq!(sanitize_file_name("pic:05/x?.png"), "pic_05_x_.png");
        assert_eq!(sanitize_file_name("Фото-2024.jpg"), "Фото-2024.jpg");
        assert_eq!(sanitize_file_name("a b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_file_name("日本.png"), "__.png");
    }

    #[test]
    fn collision_suffix_goes_before_extension() {
        assert_eq!(with_collision_suffix("a.jpg", 1), "a_(1).jpg");
        assert_eq!(with_collision_suffix("a.tar.gz", 2), "a.tar_(2).gz");
        assert_eq!(with_collision_suffix("README", 1), "README_(1)");
        assert_eq!(with_collision_suffix(".env", 1), ".env_(1)");
    }

    #[test]
    fn repeated_names_get_numbered() {
        let mut mapping = FilenameMapping::default();
        for id in ["id1", "id2", "id3"] {
            mapping.insert_attachment(&attachment(&format!("00/{id}"), "a.jpg"));
        }

        let (_dir, names) = remap_all(&mapping, &["id1", "id2", "id3"]);
        assert_eq!(
            names,
            vec![
                Some("a.jpg".to_string()),
                Some("a_(1).jpg".to_string()),
                Some("a_(2).jpg".to_string()),
            ]
        );
    }

    #[test]
    fn suffixed_name_already_in_use_is_skipped() {
        let mut mapping = FilenameMapping::default();
        mapping.insert_attachment(&attachment("00/id1", "a.jpg"));
        mapping.insert_attachment(&attachment("00/id2", "a.jpg"));

        // 一个没有映射的不透明文件恰好叫 `a_(1).jpg`
        let (dir, names) = remap_all(&mapping, &["id1", "a_(1).jpg", "id2"]);
        assert_eq!(
            names,
            vec![Some("a.jpg".to_string()), None, Some("a_(2).jpg".to_string())]
        );
        assert_eq!(fs::read(dir.path().join("a_(1).jpg")).unwrap(), b"a_(1).jpg");
        assert_eq!(fs::read(dir.path().join("a_(2).jpg")).unwrap(), b"id2");
    }

    #[test]
    fn dot_names_become_unnamed() {
        let mut mapping = FilenameMapping::default();
        mapping.insert_attachment(&attachment("00/dot", "."));
        mapping.insert_attachment(&attachment("00/dotdot", ".."));

        let (dir, names) = remap_all(&mapping, &["dot", "dotdot"]);
        assert_eq!(
            names,
            vec![Some("unnamed".to_string()), Some("unnamed_(1)".to_string())]
        );
        assert_eq!(fs::read(dir.path().join("unnamed")).unwrap(), b"dot");
        assert_eq!(fs::read(dir.path().join("unnamed_(1)")).unwrap(), b"dotdot");
    }

    #[test]
    fn thumbnails_empty_names_and_reserved_names() {
        let mut mapping = FilenameMapping::default();
        mapping.insert_attachment(&AttachmentRef {
            path: Some("00/full".into()),
            file_name: Some("map.json".into()),
            thumbnail: Some(ThumbnailRef {
                path: Some("00/thumb".into()),
                content_type: None,
            }),
            ..Default::default()
        });
        mapping.insert_attachment(&AttachmentRef {
            path: Some("00/noname".into()),
            ..Default::default()
        });

        let (dir, names) = remap_all(&mapping, &["full", "thumb", "noname"]);
        assert_eq!(names[0].as_deref(), Some("_map.json"));
        assert_eq!(names[1].as_deref(), Some("thumb__map.json"));
        assert_eq!(names[2].as_deref(), Some("unnamed"));

        let map: BTreeMap<String, String> =
            serde_json::from_slice(&fs::read(dir.path().join(MAP_FILE)).unwrap()).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["full"], "_map.json");
    }

    #[test]
    fn avatars_use_formatted_conversation_id() {
        let mut mapping = FilenameMapping::default();
        mapping.insert_avatar("https://host.example/room/abc", "ff/avatar1");
        mapping.insert_avatar("05abc", "/abs/path/ee/avatar2");

        assert_eq!(
            mapping.get("avatar1").map(|l| l.name.as_str()),
            Some("avatar_host.example_room_abc.jpeg")
        );
        assert_eq!(
            mapping.get("avatar2").map(|l| l.name.as_str()),
            Some("avatar_05abc.jpeg")
        );
    }

    #[test]
    fn unmapped_files_stay_in_place() {
        let mut mapping = FilenameMapping::default();
        mapping.insert_attachment(&attachment("00/known", "doc.pdf"));

        let (dir, names) = remap_all(&mapping, &["known", "stranger"]);
        assert_eq!(names, vec![Some("doc.pdf".to_string()), None]);
        assert!(dir.path().join("stranger").exists());

        let map: BTreeMap<String, String> =
            serde_json::from_slice(&fs::read(dir.path().join(MAP_FILE)).unwrap()).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn logical_name_never_overwrites_pending_opaque_file() {
        let mut mapping = FilenameMapping::default();
        mapping.insert_attachment(&attachment("00/first", "second"));

        let (dir, names) = remap_all(&mapping, &["first", "second"]);
        assert_eq!(names[0].as_deref(), Some("second_(1)"));
        assert_eq!(fs::read(dir.path().join("second")).unwrap(), b"second");
    }

    #[test]
    fn map_is_deterministic_for_same_input() {
        let mut mapping = FilenameMapping::default();
        for (id, name) in [("b", "x.png"), ("a", "x.png"), ("c", "y.png")] {
            mapping.insert_attachment(&attachment(&format!("00/{id}"), name));
        }

        let (first, _) = remap_all(&mapping, &["a", "b", "c"]);
        let (second, _) = remap_all(&mapping, &["a", "b", "c"]);
        assert_eq!(
            fs::read(first.path().join(MAP_FILE)).unwrap(),
            fs::read(second.path().join(MAP_FILE)).unwrap()
        );
    }
}
