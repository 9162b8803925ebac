//! API 客户端 - 带离线队列的 HTTP 调用
//!
//! # 离线队列
//! 离线时因网络错误失败的请求不会立即返回错误，而是进入 FIFO 缓冲，
//! 调用方的 future 保持挂起。每次 OFFLINE → ONLINE 转换只排空一次缓冲：
//! 在转换的同时取走快照并清空，然后按到达顺序逐个处理：
//! - 排队超过 5 分钟：返回 `ApiError::Stale`，不发请求
//! - 否则重放一次，用结果完成调用方的 future
//! - 重放时又断网（网络错误且客户端已离线）：放回新的缓冲，等下一次转换，本轮不再重试
//!
//! 非网络错误（任何 HTTP 响应，包括 4xx/5xx）永远不进入队列。
//! 401 会清除凭证、提示用户并延迟跳转登录页。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use serde::de::DeserializeOwned;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::request::{ApiResponse, HttpRequest, Method, RequestConfig};
use super::transport::{HttpTransport, ReqwestTransport};
use crate::config::StorefrontConfig;
use crate::notification::{NotificationManager, ShowOptions};
use crate::platform::Platform;
use crate::storage::JsonStorage;

/// 排队请求的最长有效期
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// 网络连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

/// 一次排空的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 实际重放的请求数
    pub replayed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 超时未重放
    pub stale: usize,
    /// 重放时再次断网，留给下一次转换
    pub requeued: usize,
}

type Responder = oneshot::Sender<Result<ApiResponse, ApiError>>;

/// 离线缓冲中的请求
struct QueuedRequest {
    endpoint: String,
    config: RequestConfig,
    arrived_at: Instant,
    responder: Responder,
}

struct ClientState {
    connectivity: Connectivity,
    queue: VecDeque<QueuedRequest>,
    redirect_pending: bool,
}

struct ClientInner {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    storage: JsonStorage,
    platform: Arc<dyn Platform>,
    notifier: Option<NotificationManager>,
    login_path: String,
    redirect_delay: Duration,
    state: Mutex<ClientState>,
}

/// API 客户端
///
/// `Clone` 得到同一个客户端（共享离线队列）的另一个句柄。
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

/// `ApiClient` 构建器
pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    transport: Option<Arc<dyn HttpTransport>>,
    storage: Option<JsonStorage>,
    platform: Arc<dyn Platform>,
    notifier: Option<NotificationManager>,
    login_path: String,
    redirect_delay: Duration,
}

impl ApiClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn storage(mut self, storage: JsonStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn notifier(mut self, notifier: NotificationManager) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    /// 构建客户端，初始连接状态取自 `Platform::is_online()`
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.timeout)?),
        };
        let connectivity = Connectivity::from_online(self.platform.is_online());
        debug!(base_url = %self.base_url, ?connectivity, "API client created");

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                base_url: self.base_url,
                transport,
                storage: self.storage.unwrap_or_else(JsonStorage::in_memory),
                platform: self.platform,
                notifier: self.notifier,
                login_path: self.login_path,
                redirect_delay: self.redirect_delay,
                state: Mutex::new(ClientState {
                    connectivity,
                    queue: VecDeque::new(),
                    redirect_pending: false,
                }),
            }),
        })
    }
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        let defaults = StorefrontConfig::default();
        let redirect_delay = defaults.redirect_delay();
        ApiClientBuilder {
            base_url: base_url.into(),
            timeout: defaults.request_timeout(),
            transport: None,
            storage: None,
            platform: Arc::new(crate::platform::StaticPlatform::default()),
            notifier: None,
            login_path: defaults.login_path,
            redirect_delay,
        }
    }

    /// 按配置创建构建器
    pub fn builder_from_config(config: &StorefrontConfig) -> ApiClientBuilder {
        Self::builder(config.api_base_url.clone())
            .timeout(config.request_timeout())
            .login_path(config.login_path.clone())
            .redirect_delay(config.redirect_delay())
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.inner.state()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.state().connectivity
    }

    pub fn is_online(&self) -> bool {
        self.connectivity() == Connectivity::Online
    }

    /// 离线缓冲中的请求数
    pub fn pending_requests(&self) -> usize {
        self.state().queue.len()
    }

    pub fn storage(&self) -> &JsonStorage {
        &self.inner.storage
    }

    /// 更新连接状态
    ///
    /// OFFLINE → ONLINE 时取走缓冲快照并启动一次排空，返回排空任务；其他情况返回 `None`。
    pub fn set_connectivity(&self, online: bool) -> Option<JoinHandle<DrainReport>> {
        let next = Connectivity::from_online(online);
        let snapshot = {
            let mut state = self.state();
            let previous = state.connectivity;
            state.connectivity = next;
            if previous == Connectivity::Offline && next == Connectivity::Online {
                Some(std::mem::take(&mut state.queue))
            } else {
                None
            }
        };

        match snapshot {
            Some(entries) => {
                info!(pending = entries.len(), "Back online, draining offline queue");
                let client = self.clone();
                Some(tokio::spawn(async move { client.drain(entries).await }))
            }
            None => {
                debug!(?next, "Connectivity updated");
                None
            }
        }
    }

    /// 监听平台的在线/离线信号，每次变化调用 `set_connectivity`
    pub fn watch_connectivity(&self, mut signals: watch::Receiver<bool>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while signals.changed().await.is_ok() {
                let online = *signals.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                ApiClient { inner }.set_connectivity(online);
            }
        })
    }

    async fn drain(&self, entries: VecDeque<QueuedRequest>) -> DrainReport {
        let mut report = DrainReport::default();

        for entry in entries {
            let age = entry.arrived_at.elapsed();
            if age >= STALE_AFTER {
                debug!(endpoint = %entry.endpoint, age_secs = age.as_secs(), "Dropping stale queued request");
                report.stale += 1;
                let _ = entry.responder.send(Err(ApiError::Stale { age }));
                continue;
            }

            report.replayed += 1;
            let result = self.dispatch(&entry.endpoint, &entry.config).await;
            match result {
                Err(e) if e.is_network() && entry.config.queue_if_offline && !self.is_online() => {
                    debug!(endpoint = %entry.endpoint, "Replay failed while offline, requeueing");
                    report.requeued += 1;
                    self.state().queue.push_back(entry);
                }
                result => {
                    if result.is_ok() {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                    let _ = entry.responder.send(result);
                }
            }
        }

        info!(
            replayed = report.replayed,
            succeeded = report.succeeded,
            failed = report.failed,
            stale = report.stale,
            requeued = report.requeued,
            "Offline queue drained"
        );
        report
    }

    /// 发起请求
    ///
    /// 离线时网络失败的请求进入缓冲，返回的 future 直到排空时才完成。
    pub async fn request(&self, endpoint: &str, config: RequestConfig) -> Result<ApiResponse, ApiError> {
        let error = match self.dispatch(endpoint, &config).await {
            Err(e) if e.is_network() && config.queue_if_offline => e,
            other => return other,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state();
            if state.connectivity == Connectivity::Online {
                return Err(error);
            }
            state.queue.push_back(QueuedRequest {
                endpoint: endpoint.to_string(),
                config,
                arrived_at: Instant::now(),
                responder: tx,
            });
            info!(endpoint = %endpoint, pending = state.queue.len(), "Offline, request queued");
        }

        rx.await.unwrap_or(Err(ApiError::Dropped))
    }

    pub async fn get(&self, endpoint: &str) -> Result<ApiResponse, ApiError> {
        self.request(endpoint, RequestConfig::new(Method::Get)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.get(endpoint).await?.decode()
    }

    pub async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<ApiResponse, ApiError> {
        self.request(endpoint, RequestConfig::new(Method::Post).with_body(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: serde_json::Value) -> Result<ApiResponse, ApiError> {
        self.request(endpoint, RequestConfig::new(Method::Put).with_body(body)).await
    }

    pub async fn patch(&self, endpoint: &str, body: serde_json::Value) -> Result<ApiResponse, ApiError> {
        self.request(endpoint, RequestConfig::new(Method::Patch).with_body(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<ApiResponse, ApiError> {
        self.request(endpoint, RequestConfig::new(Method::Delete)).await
    }

    /// 单次调用，不排队
    async fn dispatch(&self, endpoint: &str, config: &RequestConfig) -> Result<ApiResponse, ApiError> {
        let request = self.build_request(endpoint, config);
        debug!(method = %request.method, url = %request.url, "Sending request");

        let response = match self.inner.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(endpoint = %endpoint, error = %e, "Request failed");
                return Err(e);
            }
        };

        if response.status == 401 {
            self.handle_unauthorized();
            return Err(ApiError::Unauthorized);
        }

        if !response.is_success() {
            let error = ApiError::Status {
                status: response.status,
                body: response.body.as_text(),
            };
            warn!(endpoint = %endpoint, status = response.status, "Request returned error status");
            if let Some(message) = error.user_message() {
                self.notify_error(message);
            }
            return Err(error);
        }

        Ok(response)
    }

    fn build_request(&self, endpoint: &str, config: &RequestConfig) -> HttpRequest {
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(token) = self.inner.storage.auth_token() {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        for (name, value) in &config.headers {
            headers.insert(name.clone(), value.clone());
        }

        HttpRequest {
            method: config.method,
            url: join_url(&self.inner.base_url, endpoint),
            headers,
            body: config.body.clone(),
        }
    }

    fn handle_unauthorized(&self) {
        warn!("Received 401, clearing credentials");
        self.inner.storage.clear_auth_token();
        if let Some(message) = ApiError::Unauthorized.user_message() {
            self.notify_error(message);
        }

        {
            let mut state = self.state();
            if state.redirect_pending {
                return;
            }
            state.redirect_pending = true;
        }

        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.redirect_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.platform.navigate(&inner.login_path);
                inner.state().redirect_pending = false;
            }
        });
    }

    fn notify_error(&self, message: &str) {
        if let Some(notifier) = &self.inner.notifier {
            notifier.error(message, ShowOptions::new());
        }
    }
}

impl ClientInner {
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 拼接基础地址和路径，绝对 URL 原样返回
pub fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
