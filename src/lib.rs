//! AniWay Notify - 通知推送客户端与本地收件箱

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod notification;
pub mod session;
pub mod transport;

pub use client::{HttpNotificationApi, NotificationApi, NotificationListResponse, StatusFilter};
pub use config::ClientConfig;
pub use error::{NotifyError, Result};
pub use identity::Identity;
pub use notification::{
    resolve_target, target_for, AppendOutcome, Category, InboxSnapshot, InboxSummaryHint, Location,
    MemoryLocation, NotificationEvent, NotificationKind, NotificationStatus, NotificationStore,
    PageOutcome, SideEffectRouter, SummaryCache, SummaryField,
};
pub use session::NotificationSession;
pub use transport::{
    BackoffPolicy, ChannelHandle, ChannelSink, ConnectionHealth, ConnectionState,
    NotificationTransport, ReconnectSupervisor, SseTransport,
};
