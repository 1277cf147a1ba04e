//! 错误分类
//!
//! - `Transport`：通道级错误，交给重连监督器退避重试
//! - `Decode`：单条消息无法解析，记录日志后跳过
//! - `Request`：REST 调用失败，返回给调用方，本地状态保持不变
//! - `StaleResolution`：请求返回时身份已变化，静默丢弃

use thiserror::Error;

/// 通知客户端错误
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 推送通道失败（连接失败、非 2xx、流中断或服务端关闭）
    #[error("transport error: {0}")]
    Transport(String),

    /// 单条推送消息解码失败
    #[error("failed to decode notification: {0}")]
    Decode(#[from] serde_json::Error),

    /// REST 协作方调用失败
    #[error("{op} failed: {reason}")]
    Request { op: &'static str, reason: String },

    /// 请求返回时所属身份（或代数）已变化
    #[error("stale resolution (generation {expected} -> {current})")]
    StaleResolution { expected: u64, current: u64 },

    /// 未绑定身份
    #[error("no identity bound")]
    NotSignedIn,
}

impl NotifyError {
    pub fn request(op: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Request {
            op,
            reason: reason.to_string(),
        }
    }

    /// 是否应静默处理（不向用户展示）
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::StaleResolution { .. })
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_resolution_is_silent() {
        let err = NotifyError::StaleResolution {
            expected: 1,
            current: 2,
        };
        assert!(err.is_silent());
        assert!(!NotifyError::request("mark_read", "boom").is_silent());
        assert!(!NotifyError::NotSignedIn.is_silent());
    }

    #[test]
    fn test_request_error_message() {
        let err = NotifyError::request("mark_all_read", "HTTP 500");
        assert_eq!(err.to_string(), "mark_all_read failed: HTTP 500");
    }

    #[test]
    fn test_decode_error_from_serde() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{bad");
        let err: NotifyError = parse.unwrap_err().into();
        assert!(matches!(err, NotifyError::Decode(_)));
    }
}
