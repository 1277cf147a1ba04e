//! 推送通道
//!
//! - `NotificationTransport`：打开一条长连接，不做任何重试
//! - `ChannelSink`：通道回调（打开 / 消息 / 失败）
//! - `ChannelHandle`：幂等关闭，关闭本身不会触发 `on_error`

pub mod sse;
pub mod supervisor;

pub use sse::{SseDecoder, SseMessage, SseTransport};
pub use supervisor::{BackoffPolicy, ConnectionHealth, ConnectionState, ReconnectSupervisor};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::NotifyError;
use crate::identity::Identity;
use crate::notification::event::NotificationEvent;

/// 通道回调
pub trait ChannelSink: Send + Sync {
    /// 连接建立（收到成功响应）
    fn on_open(&self) {}

    /// 每条解码成功的消息调用一次
    fn on_event(&self, event: NotificationEvent);

    /// 每条通道最多调用一次
    fn on_error(&self, error: NotifyError);
}

/// 推送通道的打开方式
pub trait NotificationTransport: Send + Sync {
    /// 为给定身份打开通道。需在 tokio runtime 内调用。
    fn open(&self, identity: &Identity, sink: Arc<dyn ChannelSink>) -> ChannelHandle;
}

/// 通道句柄
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    cancel: CancellationToken,
}

impl ChannelHandle {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
        }
    }

    /// 供传输实现监听关闭信号
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 关闭通道，可重复调用
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for ChannelHandle {
    fn default() -> Self {
        Self::new()
    }
}
