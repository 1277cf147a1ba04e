//! Shared collaborators for integration tests

#![allow(dead_code)]

use aniway_notify::{
    ChannelHandle, ChannelSink, Identity, InboxSummaryHint, NotificationApi, NotificationEvent,
    NotificationKind, NotificationListResponse, NotificationStatus, NotificationTransport,
    NotifyError, Result, StatusFilter,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn unread(id: u64, kind: NotificationKind) -> NotificationEvent {
    NotificationEvent::unread(id, kind)
}

pub fn read(id: u64) -> NotificationEvent {
    NotificationEvent::new(id, NotificationKind::CommentReply, NotificationStatus::Read)
}

/// Ids in descending order, all UNREAD
pub fn unread_page(ids: impl DoubleEndedIterator<Item = u64>) -> Vec<NotificationEvent> {
    ids.rev()
        .map(|id| unread(id, NotificationKind::CommentReply))
        .collect()
}

/// In-memory REST collaborator
#[derive(Default)]
pub struct MockApi {
    pages: Mutex<HashMap<usize, Vec<NotificationEvent>>>,
    unread_count: Mutex<u64>,
    summary: Mutex<InboxSummaryHint>,
    gate: Mutex<Option<Arc<Notify>>>,
    fail: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_page(&self, index: usize, items: Vec<NotificationEvent>) {
        self.pages.lock().unwrap().insert(index, items);
    }

    pub fn set_unread_count(&self, count: u64) {
        *self.unread_count.lock().unwrap() = count;
    }

    pub fn set_summary(&self, summary: InboxSummaryHint) {
        *self.summary.lock().unwrap() = summary;
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Every following call blocks until the returned gate is notified
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn release(&self) {
        self.gate.lock().unwrap().take();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, op: &'static str, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail.lock().unwrap() {
            return Err(NotifyError::request(op, "HTTP 503"));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationApi for MockApi {
    async fn fetch_page(
        &self,
        identity: &Identity,
        status: StatusFilter,
        page: usize,
        size: usize,
    ) -> Result<NotificationListResponse> {
        self.enter(
            "fetch page",
            format!("fetch {} {} {} {}", identity.user_id, status.as_str(), page, size),
        )
        .await?;
        let items = self.pages.lock().unwrap().get(&page).cloned().unwrap_or_default();
        Ok(NotificationListResponse {
            items,
            unread_count: *self.unread_count.lock().unwrap(),
            next_cursor: None,
        })
    }

    async fn unread_count(&self, identity: &Identity) -> Result<u64> {
        self.enter("unread count", format!("unread {}", identity.user_id))
            .await?;
        Ok(*self.unread_count.lock().unwrap())
    }

    async fn mark_read(&self, identity: &Identity, ids: &[u64]) -> Result<u64> {
        self.enter("mark read", format!("mark-read {} {:?}", identity.user_id, ids))
            .await?;
        Ok(ids.len() as u64)
    }

    async fn mark_all_read(&self, identity: &Identity) -> Result<u64> {
        self.enter("mark all read", format!("mark-all {}", identity.user_id))
            .await?;
        Ok(0)
    }

    async fn delete_all(&self, identity: &Identity) -> Result<u64> {
        self.enter("delete all", format!("delete-all {}", identity.user_id))
            .await?;
        Ok(0)
    }

    async fn inbox_summary(&self, identity: &Identity) -> Result<InboxSummaryHint> {
        self.enter("inbox summary", format!("summary {}", identity.user_id))
            .await?;
        Ok(*self.summary.lock().unwrap())
    }
}

/// One opened channel as seen by the test
pub struct MockChannel {
    pub user_id: u64,
    pub sink: Arc<dyn ChannelSink>,
    pub handle: ChannelHandle,
}

/// Transport that records every open and lets the test drive callbacks
#[derive(Default)]
pub struct MockTransport {
    channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opened(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn channel(&self, index: usize) -> Arc<MockChannel> {
        self.channels.lock().unwrap()[index].clone()
    }

    pub fn last(&self) -> Arc<MockChannel> {
        self.channels
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no channel opened")
    }
}

impl NotificationTransport for MockTransport {
    fn open(&self, identity: &Identity, sink: Arc<dyn ChannelSink>) -> ChannelHandle {
        let handle = ChannelHandle::new();
        self.channels.lock().unwrap().push(Arc::new(MockChannel {
            user_id: identity.user_id,
            sink,
            handle: handle.clone(),
        }));
        handle
    }
}
