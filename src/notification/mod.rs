//! 通知模型与本地收件箱
//!
//! - `event`：通知类型与线上格式
//! - `state`：纯内存收件箱（排序、去重、计数不变式）
//! - `store`：异步操作入口，负责与 REST 协作方对账
//! - `router`：首次未读推送触发的副作用
//! - `summary`：私信 / 频道 / 好友请求的建议性计数
//! - `target`：跳转目标解析

pub mod event;
pub mod router;
pub mod state;
pub mod store;
pub mod summary;
pub mod target;

pub use event::{Category, NotificationEvent, NotificationKind, NotificationStatus};
pub use router::{Location, MemoryLocation, RouteEffect, SideEffectRouter};
pub use state::{AppendOutcome, InboxSnapshot, InboxState, PageOutcome};
pub use store::NotificationStore;
pub use summary::{InboxSummaryHint, SummaryCache, SummaryField};
pub use target::{resolve_target, target_for};
