//! REST 协作方
//!
//! 身份显式传入每一次调用：总是携带 `X-User-Id`，有 token 时额外携带 `Authorization: Bearer`。

mod rest;

pub use rest::HttpNotificationApi;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identity::Identity;
use crate::notification::event::NotificationEvent;
use crate::notification::summary::InboxSummaryHint;

/// 列表查询的状态过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Unread,
    Read,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Unread => "UNREAD",
            Self::Read => "READ",
        }
    }
}

/// `GET /notifications` 的响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    #[serde(default)]
    pub items: Vec<NotificationEvent>,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<u64>,
}

/// 通知服务的 REST 接口
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// 拉取一页通知
    async fn fetch_page(
        &self,
        identity: &Identity,
        status: StatusFilter,
        page: usize,
        size: usize,
    ) -> Result<NotificationListResponse>;

    /// 权威未读数
    async fn unread_count(&self, identity: &Identity) -> Result<u64>;

    /// 标记已读，返回服务端实际修改的条数
    async fn mark_read(&self, identity: &Identity, ids: &[u64]) -> Result<u64>;

    async fn mark_all_read(&self, identity: &Identity) -> Result<u64>;

    async fn delete_all(&self, identity: &Identity) -> Result<u64>;

    /// 收件箱摘要（私信 / 频道 / 好友请求）
    async fn inbox_summary(&self, identity: &Identity) -> Result<InboxSummaryHint>;
}

/// 给请求附加身份头
pub(crate) fn authorize(builder: RequestBuilder, identity: &Identity) -> RequestBuilder {
    let builder = builder.header("X-User-Id", identity.user_id.to_string());
    match identity.token.as_deref() {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}
