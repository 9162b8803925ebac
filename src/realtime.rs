//! 实时通道 - 接收服务端推送并分发
//!
//! 帧格式为 JSON：`{"type": "...", "data": {...}}`
//! - `notification`：转给 `NotificationManager` 显示
//! - 其他类型（`cart_updated`、`product_updated` 等）：转给 `EventSink`
//!
//! 断线后按指数退避重连，超过最大次数后放弃；连接成功会重置计数。
//!
//! `StreamConnector` 通过 HTTP 长连接接收帧，兼容 SSE（`data:` 行）
//! 和每行一个 JSON 的流。

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::notification::{NotificationManager, Severity, ShowOptions};

/// 建立连接，返回入站帧的接收端；接收端关闭表示连接断开
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<mpsc::Receiver<String>>;
}

/// 按行切分字节流，提取帧
///
/// - `data:` 开头的行取冒号后的内容（SSE）
/// - `:` 开头的注释行、`event:` / `id:` / `retry:` 字段和空行忽略
/// - 其他行原样作为一帧
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// 追加一段字节，返回其中完整行解析出的帧
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = Self::decode_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// 流结束时处理最后一行（没有换行结尾）
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_line(&rest)
    }

    fn decode_line(raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with(':') {
            return None;
        }
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim_start();
            return (!data.is_empty()).then(|| data.to_string());
        }
        if ["event:", "id:", "retry:"].iter().any(|field| line.starts_with(field)) {
            return None;
        }
        Some(line.to_string())
    }
}

/// 基于 reqwest 流式响应的连接器
#[derive(Debug, Clone)]
pub struct StreamConnector {
    client: reqwest::Client,
}

impl StreamConnector {
    /// 只限制建连时间，连接建立后不设读取超时
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to create realtime HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RealtimeConnector for StreamConnector {
    async fn connect(&self, url: &str) -> Result<mpsc::Receiver<String>> {
        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Cannot connect to {}", url))?;

        if !response.status().is_success() {
            bail!("Realtime endpoint returned HTTP {}", response.status().as_u16());
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::default();
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        for frame in decoder.push(&chunk) {
                            if tx.send(frame).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Realtime stream interrupted");
                        break;
                    }
                }
            }
            if let Some(frame) = decoder.finish() {
                let _ = tx.send(frame).await;
            }
        });

        Ok(rx)
    }
}

/// 非通知类消息的去向
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, data: &Value);
}

/// 只记录日志的 sink
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &str, data: &Value) {
        debug!(event = %event, data = %data, "Realtime event");
    }
}

/// 入站消息
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeMessage {
    Notification { message: String, severity: Severity },
    CartUpdated(Value),
    ProductUpdated(Value),
    Other { kind: String, data: Value },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl RealtimeMessage {
    /// 解析一帧，非法 JSON 或缺少 `type` 返回 `None`
    pub fn parse(raw: &str) -> Option<Self> {
        let frame: RawFrame = serde_json::from_str(raw).ok()?;
        let message = match frame.kind.as_str() {
            "notification" => {
                let message = frame
                    .data
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string();
                let severity = frame
                    .data
                    .get("type")
                    .or_else(|| frame.data.get("severity"))
                    .and_then(|s| s.as_str())
                    .map(Severity::parse_lossy)
                    .unwrap_or_default();
                RealtimeMessage::Notification { message, severity }
            }
            "cart_updated" => RealtimeMessage::CartUpdated(frame.data),
            "product_updated" => RealtimeMessage::ProductUpdated(frame.data),
            _ => RealtimeMessage::Other {
                kind: frame.kind,
                data: frame.data,
            },
        };
        Some(message)
    }
}

/// 实时通道结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeOutcome {
    /// 超过最大重连次数
    GaveUp { attempts: u32 },
}

/// 实时通道客户端
pub struct RealtimeClient {
    url: String,
    connector: Arc<dyn RealtimeConnector>,
    notifier: NotificationManager,
    sink: Arc<dyn EventSink>,
    reconnect: ReconnectConfig,
}

impl RealtimeClient {
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn RealtimeConnector>,
        notifier: NotificationManager,
        sink: Arc<dyn EventSink>,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            url: url.into(),
            connector,
            notifier,
            sink,
            reconnect,
        }
    }

    pub fn spawn(self) -> JoinHandle<RealtimeOutcome> {
        tokio::spawn(self.run())
    }

    /// 连接并处理消息，断线重连，直到超过最大重连次数
    pub async fn run(self) -> RealtimeOutcome {
        let mut attempts: u32 = 0;

        loop {
            match self.connector.connect(&self.url).await {
                Ok(mut frames) => {
                    info!(url = %self.url, "Realtime channel connected");
                    attempts = 0;
                    while let Some(frame) = frames.recv().await {
                        self.handle_frame(&frame);
                    }
                    warn!(url = %self.url, "Realtime channel closed");
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Realtime connect failed");
                }
            }

            attempts += 1;
            if attempts > self.reconnect.max_attempts {
                warn!(attempts = self.reconnect.max_attempts, "Realtime reconnect attempts exhausted");
                return RealtimeOutcome::GaveUp {
                    attempts: self.reconnect.max_attempts,
                };
            }
            let delay = self.reconnect.delay_for(attempts);
            debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Reconnecting realtime channel");
            sleep(delay).await;
        }
    }

    /// 解析并分发一帧
    pub fn handle_frame(&self, raw: &str) {
        let Some(message) = RealtimeMessage::parse(raw) else {
            warn!(frame = %raw, "Ignoring malformed realtime frame");
            return;
        };

        match message {
            RealtimeMessage::Notification { message, severity } => {
                self.notifier.show(message, severity, ShowOptions::new());
            }
            RealtimeMessage::CartUpdated(data) => self.sink.emit("cart_updated", &data),
            RealtimeMessage::ProductUpdated(data) => self.sink.emit("product_updated", &data),
            RealtimeMessage::Other { kind, data } => self.sink.emit(&kind, &data),
        }
    }
}
