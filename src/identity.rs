//! 会话身份 - 显式传递给每一次协作方调用

use serde::{Deserialize, Serialize};
use std::fmt;

/// 当前登录用户
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// 用户 ID（对应 X-User-Id 头和 stream 的 userId 参数）
    pub user_id: u64,
    /// Bearer token（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Identity {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t: &String| !t.is_empty());
        self
    }
}

// token 不进日志
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_token() {
        let identity = Identity::new(7).with_token("secret-token");
        let printed = format!("{:?}", identity);
        assert!(printed.contains("user_id: 7"));
        assert!(!printed.contains("secret-token"));
    }

    #[test]
    fn test_empty_token_is_dropped() {
        let identity = Identity::new(7).with_token("");
        assert!(identity.token.is_none());
    }
}
