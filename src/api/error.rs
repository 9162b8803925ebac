//! API 错误类型

use std::time::Duration;
use thiserror::Error;

/// API 调用错误
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 网络层失败（连接失败、超时），离线时会进入队列
    #[error("network error: {0}")]
    Network(String),

    /// 非 2xx 响应（401 除外）
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 401，凭证已清除
    #[error("session expired, please log in again")]
    Unauthorized,

    /// 离线队列中的请求超过时效，未重放
    #[error("queued request expired after {}s offline", .age.as_secs())]
    Stale { age: Duration },

    /// 离线队列被丢弃（客户端已释放）
    #[error("queued request dropped before replay")]
    Dropped,

    /// 响应体解析失败
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// HTTP 客户端初始化失败，与连接状态无关
    #[error("failed to set up HTTP client: {0}")]
    Setup(String),
}

impl ApiError {
    /// HTTP 状态码（如有）
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Unauthorized => Some(401),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// 4xx 客户端错误
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// 需要向用户展示 toast 的系统性错误，返回提示文本
    pub fn user_message(&self) -> Option<&'static str> {
        match self.status()? {
            401 => Some("Your session has expired. Please log in again."),
            403 => Some("You don't have permission to do that."),
            429 => Some("Too many requests. Please slow down."),
            s if s >= 500 => Some("Server error. Please try again later."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_client_error_classification() {
        assert!(status(404).is_client_error());
        assert!(status(400).is_client_error());
        assert!(ApiError::Unauthorized.is_client_error());
        assert!(!status(503).is_client_error());
        assert!(!ApiError::Network("timeout".to_string()).is_client_error());
    }

    #[test]
    fn test_user_message_categories() {
        assert!(ApiError::Unauthorized.user_message().is_some());
        assert!(status(403).user_message().unwrap().contains("permission"));
        assert!(status(429).user_message().unwrap().contains("Too many"));
        assert!(status(502).user_message().unwrap().contains("Server"));
        assert!(status(404).user_message().is_none());
        assert!(ApiError::Network("down".to_string()).user_message().is_none());
    }

    #[test]
    fn test_display() {
        let stale = ApiError::Stale {
            age: Duration::from_secs(400),
        };
        assert_eq!(stale.to_string(), "queued request expired after 400s offline");
        assert_eq!(status(500).to_string(), "HTTP 500: ");
    }

    #[test]
    fn test_setup_error_is_not_a_connectivity_failure() {
        let setup = ApiError::Setup("no TLS backend".to_string());
        assert!(!setup.is_network());
        assert!(setup.status().is_none());
        assert!(setup.user_message().is_none());
    }
}
