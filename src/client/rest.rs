//! 基于 reqwest 的 REST 客户端

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{authorize, NotificationApi, NotificationListResponse, StatusFilter};
use crate::config::ClientConfig;
use crate::error::{NotifyError, Result};
use crate::identity::Identity;
use crate::notification::summary::InboxSummaryHint;

/// 通知服务 HTTP 客户端
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    client: Client,
    base_url: String,
}

impl HttpNotificationApi {
    /// `base_url` 为 API 根路径（如 `http://localhost:8080/api`）
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::request("build client", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.api_root(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, identity: &Identity) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        authorize(self.client.request(method, url), identity)
    }

    async fn send<T: DeserializeOwned>(&self, op: &'static str, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| NotifyError::request(op, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(op, %status, body = %body, "Request rejected");
            return Err(NotifyError::request(op, format!("HTTP {}", status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| NotifyError::request(op, format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn fetch_page(
        &self,
        identity: &Identity,
        status: StatusFilter,
        page: usize,
        size: usize,
    ) -> Result<NotificationListResponse> {
        let builder = self.request(Method::GET, "/notifications", identity).query(&[
            ("status", status.as_str().to_string()),
            ("page", page.to_string()),
            ("size", size.to_string()),
        ]);
        self.send("fetch page", builder).await
    }

    async fn unread_count(&self, identity: &Identity) -> Result<u64> {
        let builder = self.request(Method::GET, "/notifications/unread-count", identity);
        self.send("unread count", builder).await
    }

    async fn mark_read(&self, identity: &Identity, ids: &[u64]) -> Result<u64> {
        let builder = self
            .request(Method::POST, "/notifications/mark-read", identity)
            .json(&json!({ "ids": ids }));
        self.send("mark read", builder).await
    }

    async fn mark_all_read(&self, identity: &Identity) -> Result<u64> {
        let builder = self.request(Method::POST, "/notifications/mark-all-read", identity);
        self.send("mark all read", builder).await
    }

    async fn delete_all(&self, identity: &Identity) -> Result<u64> {
        let builder = self.request(Method::DELETE, "/notifications/all", identity);
        self.send("delete all", builder).await
    }

    async fn inbox_summary(&self, identity: &Identity) -> Result<InboxSummaryHint> {
        let builder = self.request(Method::GET, "/messages/summary", identity);
        self.send("inbox summary", builder).await
    }
}
