//! `messages.json` 列的类型化模型
//!
//! 消息正文是松散的 JSON，这里按已知形状归类，
//! 无法识别的形状保留原始值，尽力而为。

use serde::Deserialize;
use serde_json::Value;

/// 消息中的一个附件引用
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentRef {
    /// 附件目录下的相对路径，最后一段即不透明文件名
    pub path: Option<String>,
    /// 发送时的原始文件名
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub thumbnail: Option<ThumbnailRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThumbnailRef {
    pub path: Option<String>,
    pub content_type: Option<String>,
}

/// 消息正文
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// 纯文本
    Text { body: String },
    /// 带附件，可能附带文字
    Attachments {
        body: Option<String>,
        attachments: Vec<AttachmentRef>,
    },
    /// 对方截图 / 保存媒体的提示
    ExtractionNotification(Value),
    /// 消息请求的接受 / 拒绝
    RequestResponse(Value),
    /// 其余形状
    Unknown(Value),
}

impl MessageBody {
    /// 解析 JSON 正文
    ///
    /// JSON 本身不合法，或 `attachments` 存在但形状不对时返回错误。
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;

        let body = value.get("body").and_then(Value::as_str).map(str::to_owned);

        if let Some(raw) = value.get("attachments").filter(|a| !a.is_null()) {
            let attachments: Vec<AttachmentRef> = Vec::deserialize(raw)?;
            if !attachments.is_empty() {
                return Ok(Self::Attachments { body, attachments });
            }
        }

        if value.get("dataExtractionNotification").is_some_and(|v| !v.is_null()) {
            return Ok(Self::ExtractionNotification(value));
        }
        if value.get("messageRequestResponse").is_some_and(|v| !v.is_null()) {
            return Ok(Self::RequestResponse(value));
        }

        match body {
            Some(body) => Ok(Self::Text { body }),
            None => Ok(Self::Unknown(value)),
        }
    }

    pub fn attachments(&self) -> &[AttachmentRef] {
        match self {
            Self::Attachments { attachments, .. } => attachments,
            _ => &[],
        }
    }
}

/// 取路径最后一段作为不透明文件名，兼容 `/` 与 `\`
pub fn opaque_basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
