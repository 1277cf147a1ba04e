//! 收件箱摘要缓存（私信 / 频道 / 好友请求计数）
//!
//! 这是建议性数据：推送到达时乐观 +1，之后被权威接口的结果覆盖。
//! 每次写入都会递增版本号；权威结果带着发起请求时的版本号回来，
//! 如果期间发生过乐观更新，则按字段取最大值合并，避免旧结果把计数拉回去。

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// 摘要计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxSummaryHint {
    pub direct_unread: u32,
    pub channel_unread: u32,
    pub pending_friend_requests: u32,
}

/// 可乐观更新的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryField {
    DirectUnread,
    ChannelUnread,
    PendingFriendRequests,
}

impl InboxSummaryHint {
    fn field_mut(&mut self, field: SummaryField) -> &mut u32 {
        match field {
            SummaryField::DirectUnread => &mut self.direct_unread,
            SummaryField::ChannelUnread => &mut self.channel_unread,
            SummaryField::PendingFriendRequests => &mut self.pending_friend_requests,
        }
    }

    fn max_with(self, other: Self) -> Self {
        Self {
            direct_unread: self.direct_unread.max(other.direct_unread),
            channel_unread: self.channel_unread.max(other.channel_unread),
            pending_friend_requests: self.pending_friend_requests.max(other.pending_friend_requests),
        }
    }
}

/// 发起权威请求时拿到的版本票据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryTicket(u64);

#[derive(Debug, Default)]
struct Inner {
    hint: Option<InboxSummaryHint>,
    version: u64,
}

/// 共享摘要缓存
#[derive(Debug, Clone)]
pub struct SummaryCache {
    inner: Arc<Mutex<Inner>>,
    ceiling: u32,
}

impl SummaryCache {
    pub fn new(ceiling: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            ceiling,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // 持锁期间不会 panic，中毒时直接沿用内部数据
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前值（尚未拿到任何数据时为 None）
    pub fn get(&self) -> Option<InboxSummaryHint> {
        self.lock().hint
    }

    /// 乐观 +1，返回新值。缓存为空时从 0 起算。
    /// ceiling 只阻止继续增长，不会压低服务端给出的更大值。
    pub fn bump(&self, field: SummaryField) -> u32 {
        let mut inner = self.lock();
        let ceiling = self.ceiling;
        let slot = inner.hint.get_or_insert_with(Default::default).field_mut(field);
        if *slot < ceiling {
            *slot += 1;
        }
        let value = *slot;
        inner.version += 1;
        value
    }

    /// 发起权威请求前调用
    pub fn begin_fetch(&self) -> SummaryTicket {
        SummaryTicket(self.lock().version)
    }

    /// 应用权威结果
    pub fn apply_authoritative(&self, ticket: SummaryTicket, fresh: InboxSummaryHint) {
        let mut inner = self.lock();
        let merged = match inner.hint {
            Some(current) if inner.version != ticket.0 => {
                debug!(
                    ticket = ticket.0,
                    version = inner.version,
                    "Summary patched while fetch in flight, merging"
                );
                fresh.max_with(current)
            }
            _ => fresh,
        };
        inner.hint = Some(merged);
        inner.version += 1;
    }

    /// 身份变化时清空
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.hint = None;
        inner.version += 1;
    }
}
