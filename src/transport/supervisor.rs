//! 重连监督器
//!
//! 状态机：`Disconnected → Connecting → Connected →(失败)→ Backoff(n) → Connecting → …`
//!
//! - 第 n 次连续失败后的等待时间为 `min(max, base × 2^(n-1))`
//! - n 只在切换身份或手动重连时归零
//! - 任意时刻最多一个待触发的重试定时器
//! - 每次打开通道都会分配新的 epoch，旧通道迟到的回调一律忽略

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelHandle, ChannelSink, NotificationTransport};
use crate::error::NotifyError;
use crate::identity::Identity;
use crate::notification::event::NotificationEvent;

/// 收到通知时的回调。在监督器锁内执行，回调里不能再调用监督器。
pub type EventHandler = Arc<dyn Fn(NotificationEvent) + Send + Sync>;

/// 指数退避
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(30_000),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// 第 `attempt` 次重试（从 0 开始）前的等待时间
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// 等待第 `attempt` 次重试
    Backoff { attempt: u32 },
}

/// 只读的连接健康度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHealth {
    pub state: ConnectionState,
    pub consecutive_failures: u32,
    /// 最近一次失败（epoch 毫秒）
    pub last_failure_ms: Option<i64>,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            last_failure_ms: None,
        }
    }
}

impl ConnectionHealth {
    pub fn is_degraded(&self, threshold: u32) -> bool {
        threshold > 0 && self.consecutive_failures >= threshold
    }
}

struct Inner {
    identity: Option<Identity>,
    /// 当前通道的 epoch
    epoch: u64,
    channel: Option<ChannelHandle>,
    /// 待触发的重试定时器及其序号
    timer: Option<(u64, CancellationToken)>,
    timer_seq: u64,
    failures: u32,
    last_failure_ms: Option<i64>,
}

impl Inner {
    fn cancel_timer(&mut self) {
        if let Some((_, token)) = self.timer.take() {
            token.cancel();
        }
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    transport: Arc<dyn NotificationTransport>,
    on_event: EventHandler,
    policy: BackoffPolicy,
    health: watch::Sender<ConnectionHealth>,
}

/// 重连监督器
#[derive(Clone)]
pub struct ReconnectSupervisor {
    shared: Arc<Shared>,
}

impl ReconnectSupervisor {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        policy: BackoffPolicy,
        on_event: EventHandler,
    ) -> Self {
        let (health, _) = watch::channel(ConnectionHealth::default());
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    identity: None,
                    epoch: 0,
                    channel: None,
                    timer: None,
                    timer_seq: 0,
                    failures: 0,
                    last_failure_ms: None,
                }),
                transport,
                on_event,
                policy,
                health,
            }),
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.shared.policy
    }

    /// 订阅健康度变化
    pub fn subscribe(&self) -> watch::Receiver<ConnectionHealth> {
        self.shared.health.subscribe()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.shared.health.borrow().clone()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.shared.lock().timer.is_some()
    }

    /// 绑定身份并立即连接（退避计数归零）
    pub fn start(&self, identity: Identity) {
        {
            let mut inner = self.shared.lock();
            inner.identity = Some(identity);
            inner.failures = 0;
            inner.last_failure_ms = None;
            inner.cancel_timer();
            inner.close_channel();
        }
        self.connect();
    }

    /// 手动重连；未绑定身份时返回 false
    pub fn reconnect(&self) -> bool {
        {
            let mut inner = self.shared.lock();
            if inner.identity.is_none() {
                return false;
            }
            inner.failures = 0;
            inner.cancel_timer();
            inner.close_channel();
        }
        info!("Manual reconnect requested");
        self.connect();
        true
    }

    /// 解绑身份：取消定时器并关闭通道
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.identity = None;
        inner.epoch += 1;
        inner.failures = 0;
        inner.cancel_timer();
        inner.close_channel();
        self.shared.publish(&inner, ConnectionState::Disconnected);
        debug!("Supervisor stopped");
    }

    fn connect(&self) {
        let (identity, epoch) = {
            let mut inner = self.shared.lock();
            let Some(identity) = inner.identity.clone() else {
                return;
            };
            inner.epoch += 1;
            self.shared.publish(&inner, ConnectionState::Connecting);
            (identity, inner.epoch)
        };

        debug!(user_id = identity.user_id, epoch, "Opening notification channel");
        let sink = Arc::new(EpochSink {
            shared: Arc::downgrade(&self.shared),
            epoch,
        });
        // 锁外打开：传输实现可能同步回调 sink
        let handle = self.shared.transport.open(&identity, sink);

        let mut inner = self.shared.lock();
        if inner.epoch == epoch {
            inner.channel = Some(handle);
        } else {
            handle.close();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, inner: &Inner, state: ConnectionState) {
        self.health.send_replace(ConnectionHealth {
            state,
            consecutive_failures: inner.failures,
            last_failure_ms: inner.last_failure_ms,
        });
    }

    fn handle_open(&self, epoch: u64) {
        let inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        info!(epoch, "Notification channel connected");
        self.publish(&inner, ConnectionState::Connected);
    }

    fn handle_event(&self, epoch: u64, event: NotificationEvent) {
        // 投递期间持锁，stop / start 返回后旧通道的事件不会再到达下游
        let inner = self.lock();
        if inner.epoch != epoch {
            debug!(id = event.id, epoch, "Dropping event from superseded channel");
            return;
        }
        (self.on_event)(event);
        drop(inner);
    }

    fn handle_failure(self: &Arc<Self>, epoch: u64, error: NotifyError) {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.identity.is_none() {
            debug!(epoch, error = %error, "Ignoring error from superseded channel");
            return;
        }

        inner.epoch += 1;
        inner.close_channel();

        let attempt = inner.failures;
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure_ms = Some(Utc::now().timestamp_millis());
        let delay = self.policy.delay(attempt);
        warn!(
            error = %error,
            failures = inner.failures,
            delay_ms = delay.as_millis() as u64,
            "Notification channel failed, scheduling reconnect"
        );

        self.schedule(&mut inner, delay);
        self.publish(&inner, ConnectionState::Backoff { attempt: inner.failures });
    }

    /// 安排重试；已有的定时器先取消
    fn schedule(self: &Arc<Self>, inner: &mut Inner, delay: Duration) {
        inner.cancel_timer();
        inner.timer_seq += 1;
        let seq = inner.timer_seq;
        let token = CancellationToken::new();
        inner.timer = Some((seq, token.clone()));

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(shared) = weak.upgrade() {
                        shared.fire_timer(seq);
                    }
                }
            }
        });
    }

    fn fire_timer(self: Arc<Self>, seq: u64) {
        {
            let mut inner = self.lock();
            if inner.timer.as_ref().map(|(current, _)| *current) != Some(seq) {
                return;
            }
            inner.timer = None;
        }
        ReconnectSupervisor { shared: self }.connect();
    }
}

/// 绑定到某个 epoch 的回调
struct EpochSink {
    shared: Weak<Shared>,
    epoch: u64,
}

impl ChannelSink for EpochSink {
    fn on_open(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_open(self.epoch);
        }
    }

    fn on_event(&self, event: NotificationEvent) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_event(self.epoch, event);
        }
    }

    fn on_error(&self, error: NotifyError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.handle_failure(self.epoch, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..7).map(|n| policy.delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn test_backoff_never_overflows() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(31), Duration::from_millis(30_000));
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_degraded_threshold() {
        let health = ConnectionHealth {
            consecutive_failures: 5,
            ..Default::default()
        };
        assert!(health.is_degraded(5));
        assert!(!health.is_degraded(6));
        assert!(!health.is_degraded(0));
    }
}
