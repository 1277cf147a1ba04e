//! 通知跳转目标解析
//!
//! 纯函数：`(kind, payload) -> Option<path>`。字段缺失时退化到更粗的路由，
//! 从不 panic，也没有副作用，可以用于预取。

use serde_json::Value;

use super::event::{NotificationEvent, NotificationKind};

/// 解析跳转目标
pub fn resolve_target(kind: NotificationKind, payload: Option<&Value>) -> Option<String> {
    let field = |key: &str| payload.and_then(|p| id_field(p, key));

    let target = match kind {
        NotificationKind::ProfileComment | NotificationKind::CommentReply => {
            let anchor = field("commentId").map(|c| format!("#comment-{}", c));
            match (field("chapterId"), field("mangaId")) {
                (Some(chapter), _) if anchor.is_some() => {
                    format!("/reader/{}{}", chapter, anchor.unwrap_or_default())
                }
                (_, Some(manga)) => format!("/manga/{}{}", manga, anchor.unwrap_or_default()),
                (Some(chapter), None) => format!("/reader/{}", chapter),
                (None, None) => "/notifications".to_string(),
            }
        }
        NotificationKind::ReplyInForumThread => match (field("threadId"), field("postId")) {
            (Some(thread), Some(post)) => format!("/forum/thread/{}#post-{}", thread, post),
            (Some(thread), None) => format!("/forum/thread/{}", thread),
            (None, _) => "/forum".to_string(),
        },
        NotificationKind::BookmarkNewChapter => match (field("chapterId"), field("mangaId")) {
            (Some(chapter), _) => format!("/reader/{}", chapter),
            (None, Some(manga)) => format!("/manga/{}", manga),
            (None, None) => "/bookmarks".to_string(),
        },
        NotificationKind::FriendRequestReceived => "/profile?tab=friends".to_string(),
        NotificationKind::FriendRequestAccepted => match field("accepterId") {
            Some(user) => format!("/profile/{}", user),
            None => "/profile?tab=friends".to_string(),
        },
        NotificationKind::DirectMessage | NotificationKind::DirectMessageReply => {
            match field("conversationId") {
                Some(conversation) => format!("/messages/{}", conversation),
                None => "/messages".to_string(),
            }
        }
        NotificationKind::ChannelMessageReply => match field("categoryId") {
            Some(category) => format!("/chat?category={}", category),
            None => "/chat".to_string(),
        },
        NotificationKind::Other => return None,
    };

    Some(target)
}

/// 解析一条通知的跳转目标（payload 损坏时按缺失处理）
pub fn target_for(event: &NotificationEvent) -> Option<String> {
    resolve_target(event.kind, event.parsed_payload().as_ref())
}

/// 读取 id 字段：数字或非空字符串（UUID）均可
fn id_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            let safe = !s.is_empty()
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            safe.then(|| s.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_field_accepts_numbers_and_uuids() {
        let payload = json!({
            "a": 12,
            "b": "3f2a-99",
            "c": "",
            "d": null,
            "e": "../etc",
            "f": {"x": 1}
        });
        assert_eq!(id_field(&payload, "a").as_deref(), Some("12"));
        assert_eq!(id_field(&payload, "b").as_deref(), Some("3f2a-99"));
        assert_eq!(id_field(&payload, "c"), None);
        assert_eq!(id_field(&payload, "d"), None);
        assert_eq!(id_field(&payload, "e"), None);
        assert_eq!(id_field(&payload, "f"), None);
        assert_eq!(id_field(&payload, "missing"), None);
    }

    #[test]
    fn test_non_object_payload_falls_back() {
        let payload = json!([1, 2, 3]);
        assert_eq!(
            resolve_target(NotificationKind::BookmarkNewChapter, Some(&payload)).as_deref(),
            Some("/bookmarks")
        );
    }

    #[test]
    fn test_target_for_malformed_payload() {
        let mut event = NotificationEvent::unread(1, NotificationKind::ReplyInForumThread);
        event.payload = Some("{oops".to_string());
        assert_eq!(target_for(&event).as_deref(), Some("/forum"));
    }
}
