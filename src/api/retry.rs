//! 指数退避重试
//!
//! 与离线队列无关的通用工具：第 n 次失败（从 0 开始）后等待 `base_delay * 2^n` 再重试，
//! 4xx 客户端错误直接返回，不重试。

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::ApiError;

/// 错误是否带有 HTTP 状态码
pub trait RetryClassify {
    fn status_code(&self) -> Option<u16>;

    fn is_client_error(&self) -> bool {
        self.status_code().is_some_and(|s| (400..500).contains(&s))
    }
}

impl RetryClassify for ApiError {
    fn status_code(&self) -> Option<u16> {
        self.status()
    }
}

/// 第 `attempt` 次失败后的等待时间
pub fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    base_delay.saturating_mul(2u32.saturating_pow(attempt))
}

/// 最多执行 `max_attempts` 次 `operation`，返回第一次成功的结果或最后一次错误
///
/// `max_attempts` 为 0 时按 1 处理。
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify + std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_client_error() => {
                debug!(error = %e, "Client error, not retrying");
                return Err(e);
            }
            Err(e) => {
                if attempt + 1 >= max_attempts {
                    warn!(attempts = max_attempts, error = %e, "Giving up after retries");
                    return Err(e);
                }
                let delay = backoff_delay(base_delay, attempt);
                debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_on_client_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), ApiError> = with_retry(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(status(404))
                }
            },
            5,
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(result, Err(ApiError::Status { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_server_errors_with_increasing_delay() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let start = Instant::now();

        let result = with_retry(
            || {
                let log = log.clone();
                async move {
                    let mut log = log.lock().unwrap();
                    log.push(start.elapsed());
                    if log.len() < 3 {
                        Err(status(503))
                    } else {
                        Ok("done")
                    }
                }
            },
            3,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert!(first_gap >= Duration::from_millis(100));
        assert!(second_gap >= Duration::from_millis(200));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), ApiError> = with_retry(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::Network("connection refused".to_string()))
                }
            },
            3,
            Duration::from_millis(10),
        )
        .await;

        assert!(matches!(result, Err(ApiError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
