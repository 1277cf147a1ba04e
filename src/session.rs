//! 通知会话 - 把存储、推送通道和重连监督器按登录状态串起来
//!
//! 登录：绑定身份 → 打开推送通道 → 拉取第 0 页
//! 登出：解绑身份（清空工作集）→ 取消定时器并关闭通道

use std::sync::Arc;
use tracing::{debug, info};

use crate::client::{HttpNotificationApi, NotificationApi};
use crate::config::ClientConfig;
use crate::error::{NotifyError, Result};
use crate::identity::Identity;
use crate::notification::event::NotificationEvent;
use crate::notification::router::{Location, SideEffectRouter};
use crate::notification::state::PageOutcome;
use crate::notification::store::NotificationStore;
use crate::notification::summary::{InboxSummaryHint, SummaryCache};
use crate::transport::{
    BackoffPolicy, ConnectionState, NotificationTransport, ReconnectSupervisor, SseTransport,
};

/// 一个登录会话内的通知客户端
pub struct NotificationSession {
    store: NotificationStore,
    supervisor: ReconnectSupervisor,
    api: Arc<dyn NotificationApi>,
}

impl NotificationSession {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        transport: Arc<dyn NotificationTransport>,
        router: SideEffectRouter,
        policy: BackoffPolicy,
        max_retained: usize,
        page_size: usize,
    ) -> Self {
        let store = NotificationStore::new(api.clone(), router, max_retained, page_size);

        let sink = store.clone();
        let supervisor = ReconnectSupervisor::new(
            transport,
            policy,
            Arc::new(move |event: NotificationEvent| {
                sink.append_from_stream(event);
            }),
        );

        Self {
            store,
            supervisor,
            api,
        }
    }

    /// 按配置组装 HTTP + SSE 实现
    pub fn from_config(config: &ClientConfig, location: Option<Arc<dyn Location>>) -> Result<Self> {
        let api = HttpNotificationApi::from_config(config)?;
        let transport = SseTransport::new(config.api_root(), config.request_timeout())?;

        let mut router = SideEffectRouter::new(SummaryCache::new(config.summary_ceiling));
        if let Some(location) = location {
            router = router.with_location(location);
        }

        Ok(Self::new(
            Arc::new(api),
            Arc::new(transport),
            router,
            config.backoff(),
            config.max_retained,
            config.page_size,
        ))
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn supervisor(&self) -> &ReconnectSupervisor {
        &self.supervisor
    }

    pub fn summary(&self) -> &SummaryCache {
        self.store.router().summary()
    }

    /// 登录（或切换账号）：打开推送通道并拉取第 0 页
    pub async fn sign_in(&self, identity: Identity) -> Result<PageOutcome> {
        if self.store.identity().as_ref() != Some(&identity) {
            // 旧通道先停，避免旧账号的推送落进新工作集
            self.supervisor.stop();
            self.store.set_identity(Some(identity.clone()));
        }
        if self.supervisor.health().state == ConnectionState::Disconnected {
            info!(user_id = identity.user_id, "Signing in notification session");
            self.supervisor.start(identity);
        }
        // 先开通道再拉第 0 页，期间到达的推送由去重合并
        self.store.refresh().await
    }

    /// 登出：清空本地状态并停止推送
    pub fn sign_out(&self) {
        self.supervisor.stop();
        if self.store.set_identity(None) {
            info!("Signed out of notification session");
        }
    }

    /// 用权威接口刷新摘要；期间的乐观更新不会被覆盖
    pub async fn refresh_summary(&self) -> Result<InboxSummaryHint> {
        let (identity, generation) = self.store.begin()?;
        let ticket = self.summary().begin_fetch();

        let fresh = self.api.inbox_summary(&identity).await?;

        let current = self.store.generation();
        if current != generation {
            debug!(expected = generation, current, "Discarding stale summary");
            return Err(NotifyError::StaleResolution {
                expected: generation,
                current,
            });
        }
        self.summary().apply_authoritative(ticket, fresh);
        Ok(self.summary().get().unwrap_or(fresh))
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.supervisor.stop();
    }
}
