//! 通知存储 - 推送与分页两条来源的合并点
//!
//! 状态放在 `std::sync::Mutex` 里，锁从不跨越 `.await`：
//! 每个请求先在锁内记下代数，释放锁后发起请求，返回时重新加锁比较代数，
//! 代数变化（换身份或清空）则整体丢弃结果。身份也放在同一把锁里，
//! 换身份与代数递增对其它调用方是一次原子变化。

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::event::NotificationEvent;
use super::router::SideEffectRouter;
use super::state::{AppendOutcome, InboxSnapshot, InboxState, PageOutcome};
use crate::client::{NotificationApi, StatusFilter};
use crate::error::{NotifyError, Result};
use crate::identity::Identity;

/// 新通知广播容量
const INSERTED_CHANNEL_CAPACITY: usize = 64;

/// 通知存储
#[derive(Clone)]
pub struct NotificationStore {
    state: Arc<Mutex<InboxState>>,
    api: Arc<dyn NotificationApi>,
    router: SideEffectRouter,
    inserted: broadcast::Sender<NotificationEvent>,
}

impl NotificationStore {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        router: SideEffectRouter,
        max_retained: usize,
        page_size: usize,
    ) -> Self {
        let (inserted, _) = broadcast::channel(INSERTED_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(InboxState::new(max_retained, page_size))),
            api,
            router,
            inserted,
        }
    }

    fn state(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn router(&self) -> &SideEffectRouter {
        &self.router
    }

    /// 订阅新插入的通知（推送或分页首次物化的都会广播）
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inserted.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state().identity().cloned()
    }

    /// 绑定 / 解绑身份。身份变化时清空工作集和摘要，返回是否发生了变化。
    pub fn set_identity(&self, identity: Option<Identity>) -> bool {
        let mut state = self.state();
        let from = state.identity().map(|i| i.user_id);
        let to = identity.as_ref().map(|i| i.user_id);
        if !state.bind(identity) {
            return false;
        }
        // 摘要在状态锁内清空，其它调用方不会看到新身份配旧摘要
        self.router.summary().clear();
        drop(state);

        info!(?from, ?to, "Notification identity changed");
        true
    }

    pub fn snapshot(&self) -> InboxSnapshot {
        self.state().snapshot()
    }

    pub fn unread(&self) -> u64 {
        self.state().unread()
    }

    pub fn has_more(&self) -> bool {
        self.state().has_more()
    }

    pub fn generation(&self) -> u64 {
        self.state().generation()
    }

    pub fn is_seen(&self, id: u64) -> bool {
        self.state().is_seen(id)
    }

    /// 去重集合大小
    pub fn seen_len(&self) -> usize {
        self.state().seen_len()
    }

    /// 请求前的快照：身份 + 代数，在同一次加锁内读取
    pub(crate) fn begin(&self) -> Result<(Identity, u64)> {
        let state = self.state();
        let identity = state.identity().cloned().ok_or(NotifyError::NotSignedIn)?;
        Ok((identity, state.generation()))
    }

    /// 请求返回后检查代数，通过则在锁内执行 `apply`
    fn resolve<T>(&self, expected: u64, apply: impl FnOnce(&mut InboxState) -> T) -> Result<T> {
        let mut state = self.state();
        let current = state.generation();
        if current != expected {
            debug!(expected, current, "Discarding stale resolution");
            return Err(NotifyError::StaleResolution { expected, current });
        }
        Ok(apply(&mut state))
    }

    /// 合并一条推送；首次观察到的未读通知会触发副作用路由。未登录时丢弃。
    pub fn append_from_stream(&self, event: NotificationEvent) -> AppendOutcome {
        let outcome = {
            let mut state = self.state();
            if state.identity().is_none() {
                debug!(id = event.id, "Notification dropped without identity");
                return AppendOutcome::Unbound;
            }
            state.append_from_stream(event.clone())
        };

        if let AppendOutcome::Inserted { unread } = outcome {
            debug!(id = event.id, kind = event.kind.as_str(), unread, "Notification received");
            if unread {
                self.router.route(&event);
            }
            // 没有订阅者时发送失败是正常情况
            let _ = self.inserted.send(event);
        }
        outcome
    }

    /// 拉取第 `index` 页（状态 ALL）
    pub async fn load_page(&self, index: usize) -> Result<PageOutcome> {
        let (identity, generation) = self.begin()?;
        let size = self.state().page_size();

        let response = self
            .api
            .fetch_page(&identity, StatusFilter::All, index, size)
            .await?;

        let (outcome, fresh) = self.resolve(generation, |state| {
            let fresh: Vec<NotificationEvent> = response
                .items
                .iter()
                .filter(|n| !state.is_seen(n.id))
                .cloned()
                .collect();
            (state.apply_page(index, response.items, response.unread_count), fresh)
        })?;

        for event in fresh {
            let _ = self.inserted.send(event);
        }
        debug!(page = index, added = outcome.added, has_more = outcome.has_more, "Page applied");
        Ok(outcome)
    }

    /// 重新拉取第 0 页
    pub async fn refresh(&self) -> Result<PageOutcome> {
        self.load_page(0).await
    }

    /// 拉取下一页；已到末尾时返回 None
    pub async fn load_more(&self) -> Result<Option<PageOutcome>> {
        let next = {
            let state = self.state();
            if !state.has_more() {
                return Ok(None);
            }
            state.next_page()
        };
        self.load_page(next).await.map(Some)
    }

    /// 标记已读，返回本地实际翻转的条数
    pub async fn mark_read(&self, ids: &[u64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let (identity, generation) = self.begin()?;
        self.api.mark_read(&identity, ids).await?;

        let now = Utc::now().timestamp_millis();
        self.resolve(generation, |state| state.mark_read(ids, now))
    }

    /// 全部标记已读
    pub async fn mark_all(&self) -> Result<usize> {
        let (identity, generation) = self.begin()?;
        self.api.mark_all_read(&identity).await?;

        let now = Utc::now().timestamp_millis();
        self.resolve(generation, |state| state.mark_all(now))
    }

    /// 删除全部通知并清空本地工作集（不追加重新拉取）
    pub async fn clear_all(&self) -> Result<u64> {
        let (identity, generation) = self.begin()?;
        let deleted = self.api.delete_all(&identity).await?;

        self.resolve(generation, InboxState::reset)?;
        info!(deleted, "Notifications cleared");
        Ok(deleted)
    }

    /// 用服务端未读数重新锚定计数
    pub async fn refresh_unread_count(&self) -> Result<u64> {
        let (identity, generation) = self.begin()?;
        let count = self.api.unread_count(&identity).await?;

        self.resolve(generation, |state| state.set_unread(count))?;
        Ok(count)
    }
}
