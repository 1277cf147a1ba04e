//! 副作用路由 - 新的未读推送触发的少量附带动作
//!
//! 只处理白名单内的类型：
//! - 私信 / 私信回复 → `directUnread` +1
//! - 频道回复 → `channelUnread` +1
//! - 好友请求 → `pendingFriendRequests` +1，并在个人主页时把地址替换到好友标签页

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::event::{NotificationEvent, NotificationKind};
use super::summary::{SummaryCache, SummaryField};

/// 当前页面地址（由宿主界面提供）
pub trait Location: Send + Sync {
    /// 当前地址（path + query + fragment）
    fn current(&self) -> Option<String>;

    /// 原地替换地址，不新增历史记录
    fn replace(&self, url: &str);
}

/// 内存中的地址实现，用于无界面的宿主和测试
#[derive(Debug, Default)]
pub struct MemoryLocation {
    state: Mutex<MemoryLocationState>,
}

#[derive(Debug, Default)]
struct MemoryLocationState {
    current: Option<String>,
    history_len: usize,
    replacements: usize,
}

impl MemoryLocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 导航（push），历史记录 +1
    pub fn push(&self, url: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.current = Some(url.into());
        state.history_len += 1;
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).history_len
    }

    pub fn replacements(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).replacements
    }
}

impl Location for MemoryLocation {
    fn current(&self) -> Option<String> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).current.clone()
    }

    fn replace(&self, url: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.current = Some(url.to_string());
        state.replacements += 1;
    }
}

/// 一次路由产生的效果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteEffect {
    /// 被 +1 的摘要字段及新值
    pub bumped: Option<(SummaryField, u32)>,
    /// 替换后的地址
    pub rewritten: Option<String>,
}

/// 副作用路由器
#[derive(Clone)]
pub struct SideEffectRouter {
    summary: SummaryCache,
    location: Option<Arc<dyn Location>>,
}

impl SideEffectRouter {
    pub fn new(summary: SummaryCache) -> Self {
        Self {
            summary,
            location: None,
        }
    }

    pub fn with_location(mut self, location: Arc<dyn Location>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn summary(&self) -> &SummaryCache {
        &self.summary
    }

    /// 对首次观察到的未读通知执行副作用
    pub fn route(&self, event: &NotificationEvent) -> RouteEffect {
        let mut effect = RouteEffect::default();
        if !event.is_unread() {
            return effect;
        }
        let Some(field) = summary_field(event.kind) else {
            return effect;
        };

        let value = self.summary.bump(field);
        debug!(id = event.id, field = ?field, value, "Summary hint bumped");
        effect.bumped = Some((field, value));

        if event.kind == NotificationKind::FriendRequestReceived {
            if let Some(location) = &self.location {
                if let Some(next) = location.current().and_then(|url| friends_tab_url(&url)) {
                    info!(url = %next, "Redirecting profile to friends tab");
                    location.replace(&next);
                    effect.rewritten = Some(next);
                }
            }
        }

        effect
    }
}

/// 白名单映射
pub fn summary_field(kind: NotificationKind) -> Option<SummaryField> {
    match kind {
        NotificationKind::DirectMessage | NotificationKind::DirectMessageReply => {
            Some(SummaryField::DirectUnread)
        }
        NotificationKind::ChannelMessageReply => Some(SummaryField::ChannelUnread),
        NotificationKind::FriendRequestReceived => Some(SummaryField::PendingFriendRequests),
        _ => None,
    }
}

/// 个人主页缺少 `tab=friends` 时返回应替换成的地址
pub fn friends_tab_url(url: &str) -> Option<String> {
    let (rest, fragment) = match url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (url, None),
    };
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, query),
        None => (rest, ""),
    };

    if !is_profile_path(path) {
        return None;
    }

    let params: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    if params.iter().any(|p| *p == "tab=friends") {
        return None;
    }

    let mut next: Vec<&str> = params
        .into_iter()
        .filter(|p| *p != "tab" && !p.starts_with("tab="))
        .collect();
    next.push("tab=friends");

    let mut rewritten = format!("{}?{}", path, next.join("&"));
    if let Some(fragment) = fragment {
        rewritten.push('#');
        rewritten.push_str(fragment);
    }
    Some(rewritten)
}

/// `/profile` 或 `/profile/<id>`
fn is_profile_path(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    match path.strip_prefix("/profile") {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('/')
            .is_some_and(|id| !id.is_empty() && !id.contains('/')),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_with(location: Arc<MemoryLocation>) -> SideEffectRouter {
        SideEffectRouter::new(SummaryCache::new(99)).with_location(location)
    }

    #[test]
    fn test_friends_tab_url() {
        assert_eq!(friends_tab_url("/profile").as_deref(), Some("/profile?tab=friends"));
        assert_eq!(
            friends_tab_url("/profile/42?x=1").as_deref(),
            Some("/profile/42?x=1&tab=friends")
        );
        assert_eq!(
            friends_tab_url("/profile/42?tab=library#top").as_deref(),
            Some("/profile/42?tab=friends#top")
        );
        assert_eq!(friends_tab_url("/profile/42?tab=friends"), None);
        assert_eq!(friends_tab_url("/profiles"), None);
        assert_eq!(friends_tab_url("/profile/42/edit"), None);
        assert_eq!(friends_tab_url("/manga/1"), None);
    }

    #[test]
    fn test_friend_request_rewrites_profile_in_place() {
        let location = Arc::new(MemoryLocation::new());
        location.push("/profile/7");
        let router = router_with(location.clone());

        let event = NotificationEvent::unread(1, NotificationKind::FriendRequestReceived);
        let effect = router.route(&event);

        assert_eq!(effect.bumped, Some((SummaryField::PendingFriendRequests, 1)));
        assert_eq!(effect.rewritten.as_deref(), Some("/profile/7?tab=friends"));
        assert_eq!(location.current().as_deref(), Some("/profile/7?tab=friends"));
        // replace 不增加历史记录
        assert_eq!(location.history_len(), 1);
        assert_eq!(location.replacements(), 1);
    }

    #[test]
    fn test_friend_request_elsewhere_does_not_navigate() {
        let location = Arc::new(MemoryLocation::new());
        location.push("/manga/3");
        let router = router_with(location.clone());

        let effect = router.route(&NotificationEvent::unread(1, NotificationKind::FriendRequestReceived));
        assert!(effect.rewritten.is_none());
        assert_eq!(location.replacements(), 0);
    }

    #[test]
    fn test_direct_message_only_bumps() {
        let location = Arc::new(MemoryLocation::new());
        location.push("/profile");
        let router = router_with(location.clone());

        let effect = router.route(&NotificationEvent::unread(1, NotificationKind::DirectMessageReply));
        assert_eq!(effect.bumped, Some((SummaryField::DirectUnread, 1)));
        assert!(effect.rewritten.is_none());
        assert_eq!(location.current().as_deref(), Some("/profile"));
    }

    #[test]
    fn test_not_in_allow_list() {
        let router = SideEffectRouter::new(SummaryCache::new(99));
        let effect = router.route(&NotificationEvent::unread(1, NotificationKind::BookmarkNewChapter));
        assert_eq!(effect, RouteEffect::default());
        assert!(router.summary().get().is_none());
    }

    #[test]
    fn test_read_event_is_ignored() {
        let router = SideEffectRouter::new(SummaryCache::new(99));
        let mut event = NotificationEvent::unread(1, NotificationKind::ChannelMessageReply);
        event.mark_read(0);
        assert_eq!(router.route(&event), RouteEffect::default());
    }
}
