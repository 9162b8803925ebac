//! HTTP transport 抽象
//!
//! 客户端只依赖 `HttpTransport`，生产环境用 reqwest，测试中替换为 mock。
//! transport 只在网络层失败时返回错误，任何 HTTP 状态码都算成功拿到响应。

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::error::ApiError;
use super::request::{ApiResponse, HttpRequest, Method, ResponseBody};

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse, ApiError>;
}

/// 基于 reqwest 的 transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Setup(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse, ApiError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let start = std::time::Instant::now();
        let response = builder.send().await.map_err(|e| {
            ApiError::Network(format!(
                "request failed after {}ms: {}",
                start.elapsed().as_millis(),
                e
            ))
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let raw = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read response: {}", e)))?;

        debug!(
            url = %request.url,
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "HTTP request completed"
        );

        Ok(ApiResponse {
            status,
            body: ResponseBody::parse(content_type.as_deref(), raw),
        })
    }
}
