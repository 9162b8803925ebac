//! API 层 - HTTP 客户端、离线队列与重试

pub mod client;
pub mod error;
pub mod request;
pub mod retry;
pub mod transport;

pub use client::{join_url, ApiClient, ApiClientBuilder, Connectivity, DrainReport, STALE_AFTER};
pub use error::ApiError;
pub use request::{ApiResponse, HttpRequest, Method, RequestConfig, ResponseBody};
pub use retry::{backoff_delay, with_retry, RetryClassify};
pub use transport::{HttpTransport, ReqwestTransport};
