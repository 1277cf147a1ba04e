//! 客户端配置
//!
//! 读取优先级（后者覆盖前者）：
//! 1. 配置文件 `~/.config/aniway-notify/config.json`
//! 2. 环境变量 `ANIWAY_BASE_URL` / `ANIWAY_TOKEN` / `ANIWAY_USER_ID`
//! 3. 命令行参数（由 CLI 层调用 `with_*` 覆盖）

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::identity::Identity;
use crate::transport::BackoffPolicy;

/// 默认 API 地址
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// 本地最多保留的通知条数
pub const DEFAULT_MAX_RETAINED: usize = 300;

/// 摘要徽标上限
pub const DEFAULT_SUMMARY_CEILING: u32 = 99;

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API 基础 URL（不含 /notifications）
    pub base_url: String,
    /// Bearer token
    pub token: Option<String>,
    /// 用户 ID
    pub user_id: Option<u64>,
    /// 分页大小
    pub page_size: usize,
    /// 本地保留上限
    pub max_retained: usize,
    /// REST 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 退避基数（毫秒）
    pub backoff_base_ms: u64,
    /// 退避上限（毫秒）
    pub backoff_max_ms: u64,
    /// 摘要计数上限
    pub summary_ceiling: u32,
    /// 连续失败多少次后视为连接降级
    pub degraded_after_failures: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            user_id: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_retained: DEFAULT_MAX_RETAINED,
            request_timeout_secs: 15,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            summary_ceiling: DEFAULT_SUMMARY_CEILING,
            degraded_after_failures: 5,
        }
    }
}

impl ClientConfig {
    /// 默认配置文件路径
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("aniway-notify")
            .join("config.json")
    }

    /// 从配置文件和环境变量加载
    pub fn auto_load() -> Result<Self> {
        let mut config = Self::load_file(&Self::path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 读取配置文件，文件不存在时返回默认值
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// 用环境变量覆盖（`lookup` 便于测试注入）
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ANIWAY_BASE_URL").filter(|u| !u.is_empty()) {
            self.base_url = url;
        }
        if let Some(token) = lookup("ANIWAY_TOKEN").filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
        if let Some(raw) = lookup("ANIWAY_USER_ID").filter(|u| !u.is_empty()) {
            let user_id = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| anyhow!("ANIWAY_USER_ID must be a number, got {:?}", raw))?;
            self.user_id = Some(user_id);
        }
        Ok(())
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url;
        }
        self
    }

    pub fn with_user_id(mut self, user_id: Option<u64>) -> Self {
        if user_id.is_some() {
            self.user_id = user_id;
        }
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        if token.is_some() {
            self.token = token;
        }
        self
    }

    /// 去掉末尾斜杠的基础 URL
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    /// 构造会话身份，缺少 user_id 时报错
    pub fn identity(&self) -> Result<Identity> {
        let user_id = self.user_id.ok_or_else(|| {
            anyhow!(
                "No user id configured. Pass --user-id, set ANIWAY_USER_ID, \
                 or add user_id to {}",
                Self::path().display()
            )
        })?;
        let mut identity = Identity::new(user_id);
        if let Some(token) = &self.token {
            identity = identity.with_token(token.clone());
        }
        Ok(identity)
    }
}
