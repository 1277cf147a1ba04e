//! 通知事件结构
//!
//! 与服务端 `NotificationResponseDTO` 保持同一线上格式：
//! `{ id, type, status, payload, createdAtEpoch, readAtEpoch }`，
//! 其中 `payload` 是 JSON 编码后的字符串，按需再解析。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 通知类型（封闭枚举，未知类型落入 `Other`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// 个人内容下的新评论
    ProfileComment,
    /// 评论被回复
    CommentReply,
    /// 关注的论坛帖子有新回复
    ReplyInForumThread,
    /// 书签作品有新章节
    BookmarkNewChapter,
    /// 收到好友请求
    FriendRequestReceived,
    /// 好友请求被接受
    FriendRequestAccepted,
    /// 私信
    DirectMessage,
    /// 私信回复
    DirectMessageReply,
    /// 频道消息回复
    ChannelMessageReply,
    /// 未识别的类型
    #[serde(other)]
    Other,
}

/// 展示分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// 内容更新（新章节、论坛回复等），也是兜底分类
    Updates,
    /// 评论、好友、私信
    Social,
    /// 封禁、管理、系统与安全类
    Important,
}

impl Category {
    /// 按类型名关键字归类，未命中时归入 `Updates`
    pub fn of(raw_kind: &str) -> Self {
        let lower = raw_kind.to_ascii_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["comment", "friend", "message"]) {
            Self::Social
        } else if has(&["ban", "admin", "system", "security"]) {
            Self::Important
        } else {
            Self::Updates
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Updates => "updates",
            Self::Social => "social",
            Self::Important => "important",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "updates" => Some(Self::Updates),
            "social" => Some(Self::Social),
            "important" => Some(Self::Important),
            _ => None,
        }
    }
}

impl NotificationKind {
    /// 线上名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProfileComment => "PROFILE_COMMENT",
            Self::CommentReply => "COMMENT_REPLY",
            Self::ReplyInForumThread => "REPLY_IN_FORUM_THREAD",
            Self::BookmarkNewChapter => "BOOKMARK_NEW_CHAPTER",
            Self::FriendRequestReceived => "FRIEND_REQUEST_RECEIVED",
            Self::FriendRequestAccepted => "FRIEND_REQUEST_ACCEPTED",
            Self::DirectMessage => "DIRECT_MESSAGE",
            Self::DirectMessageReply => "DIRECT_MESSAGE_REPLY",
            Self::ChannelMessageReply => "CHANNEL_MESSAGE_REPLY",
            Self::Other => "OTHER",
        }
    }

    /// 从线上名称解析（大小写不敏感）
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        serde_json::from_value(Value::String(upper)).unwrap_or(Self::Other)
    }

    /// 简短标题
    pub fn title(&self) -> &'static str {
        match self {
            Self::ProfileComment => "New comment",
            Self::CommentReply => "Reply to your comment",
            Self::ReplyInForumThread => "New reply in thread",
            Self::BookmarkNewChapter => "New chapter",
            Self::FriendRequestReceived => "Friend request",
            Self::FriendRequestAccepted => "Friend request accepted",
            Self::DirectMessage => "New message",
            Self::DirectMessageReply => "Reply in conversation",
            Self::ChannelMessageReply => "Reply in channel",
            Self::Other => "Notification",
        }
    }

    pub fn category(&self) -> Category {
        Category::of(self.as_str())
    }
}

/// 已读状态，只允许 UNREAD → READ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Unread,
    Read,
}

/// 单条通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// 服务端分配的递增 ID
    pub id: u64,
    /// 通知类型
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// 已读状态
    pub status: NotificationStatus,
    /// 原始 payload（JSON 字符串，可能缺失或损坏）
    #[serde(default, deserialize_with = "payload_from_wire")]
    pub payload: Option<String>,
    /// 创建时间（epoch 毫秒）
    #[serde(rename = "createdAtEpoch", alias = "createdAt", default)]
    pub created_at: i64,
    /// 已读时间（epoch 毫秒）
    #[serde(
        rename = "readAtEpoch",
        alias = "readAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub read_at: Option<i64>,
}

impl NotificationEvent {
    pub fn new(id: u64, kind: NotificationKind, status: NotificationStatus) -> Self {
        Self {
            id,
            kind,
            status,
            payload: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            read_at: None,
        }
    }

    /// 创建未读通知
    pub fn unread(id: u64, kind: NotificationKind) -> Self {
        Self::new(id, kind, NotificationStatus::Unread)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload.to_string());
        self
    }

    /// 从 SSE data 解码
    pub fn decode(data: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn is_unread(&self) -> bool {
        self.status == NotificationStatus::Unread
    }

    /// 解析 payload；缺失或损坏时返回 None
    pub fn parsed_payload(&self) -> Option<Value> {
        self.payload
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(|v| !v.is_null())
    }

    /// 标记为已读，返回是否真正发生了状态变化
    pub fn mark_read(&mut self, now_ms: i64) -> bool {
        if self.status == NotificationStatus::Read {
            return false;
        }
        self.status = NotificationStatus::Read;
        self.read_at = Some(now_ms);
        true
    }
}

/// 兼容两种 payload 形态：JSON 字符串或内联对象
fn payload_from_wire<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_wire_format() {
        let raw = r#"{"id":10,"type":"FRIEND_REQUEST_RECEIVED","status":"UNREAD","payload":"{\"requesterId\":3}","createdAtEpoch":1700000000000,"readAtEpoch":null}"#;
        let event = NotificationEvent::decode(raw).unwrap();

        assert_eq!(event.id, 10);
        assert_eq!(event.kind, NotificationKind::FriendRequestReceived);
        assert!(event.is_unread());
        assert_eq!(event.created_at, 1_700_000_000_000);
        assert!(event.read_at.is_none());
        assert_eq!(event.parsed_payload(), Some(json!({"requesterId": 3})));
    }

    #[test]
    fn test_decode_inline_payload_object() {
        let raw = r#"{"id":1,"type":"BOOKMARK_NEW_CHAPTER","status":"READ","payload":{"mangaId":5}}"#;
        let event = NotificationEvent::decode(raw).unwrap();
        assert_eq!(event.parsed_payload(), Some(json!({"mangaId": 5})));
        assert_eq!(event.created_at, 0);
    }

    #[test]
    fn test_malformed_payload_is_tolerated() {
        let raw = r#"{"id":2,"type":"PROFILE_COMMENT","status":"UNREAD","payload":"{not json"}"#;
        let event = NotificationEvent::decode(raw).unwrap();
        assert!(event.payload.is_some());
        assert!(event.parsed_payload().is_none());
    }

    #[test]
    fn test_unknown_type_maps_to_other() {
        let raw = r#"{"id":3,"type":"SOMETHING_NEW","status":"UNREAD"}"#;
        let event = NotificationEvent::decode(raw).unwrap();
        assert_eq!(event.kind, NotificationKind::Other);
        assert!(event.payload.is_none());
    }

    #[test]
    fn test_decode_rejects_missing_id() {
        let raw = r#"{"type":"PROFILE_COMMENT","status":"UNREAD"}"#;
        assert!(NotificationEvent::decode(raw).is_err());
    }

    #[test]
    fn test_mark_read_is_monotonic() {
        let mut event = NotificationEvent::unread(1, NotificationKind::DirectMessage);
        assert!(event.mark_read(100));
        assert_eq!(event.read_at, Some(100));

        // 再次标记不会覆盖 readAt
        assert!(!event.mark_read(200));
        assert_eq!(event.read_at, Some(100));
        assert_eq!(event.status, NotificationStatus::Read);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(
            NotificationKind::parse("friend_request_received"),
            NotificationKind::FriendRequestReceived
        );
        assert_eq!(NotificationKind::parse("bogus"), NotificationKind::Other);
        assert_eq!(
            NotificationKind::parse(NotificationKind::ChannelMessageReply.as_str()),
            NotificationKind::ChannelMessageReply
        );
    }

    #[test]
    fn test_category() {
        assert_eq!(NotificationKind::BookmarkNewChapter.category(), Category::Updates);
        assert_eq!(NotificationKind::ProfileComment.category(), Category::Social);
        assert_eq!(NotificationKind::FriendRequestReceived.category(), Category::Social);
        assert_eq!(NotificationKind::ChannelMessageReply.category(), Category::Social);
        // 论坛回复不含社交关键字，归入更新
        assert_eq!(NotificationKind::ReplyInForumThread.category(), Category::Updates);
        assert_eq!(NotificationKind::Other.category(), Category::Updates);
    }

    #[test]
    fn test_category_from_raw_kind() {
        assert_eq!(Category::of("ACCOUNT_BAN"), Category::Important);
        assert_eq!(Category::of("security_alert"), Category::Important);
        assert_eq!(Category::of("NEW_RELEASE"), Category::Updates);
        assert_eq!(Category::of(""), Category::Updates);
        // 社交关键字优先
        assert_eq!(Category::of("ADMIN_MESSAGE"), Category::Social);
        assert_eq!(Category::parse(" Important "), Some(Category::Important));
        assert_eq!(Category::parse("other"), None);
    }
}
