//! Storefront CLI
//!
//! 在终端里调试 API 客户端、离线队列和 toast

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use storefront_core::api::ResponseBody;
use storefront_core::notification::{Notification, EXIT_ANIMATION};
use storefront_core::realtime::{StreamConnector, TracingSink};
use storefront_core::{
    ApiClient, FileStorage, JsonStorage, Method, NotificationManager, Position, RealtimeClient,
    RequestConfig, SearchHistory, Severity, ShowOptions, StaticPlatform, StorefrontConfig, Theme,
    ToastRenderer,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "storefront")]
#[command(about = "Storefront - toast 与离线 API 客户端调试工具")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送 API 请求
    Request {
        /// 请求路径（相对于 api_base_url）
        endpoint: String,
        /// HTTP 方法
        #[arg(long, short = 'X', default_value = "GET")]
        method: String,
        /// JSON 请求体
        #[arg(long, short)]
        data: Option<String>,
        /// 以离线状态启动，N 秒后恢复在线并排空队列
        #[arg(long)]
        offline_for: Option<u64>,
    },
    /// 显示一条 toast
    Toast {
        message: String,
        /// success | error | warning | info
        #[arg(long, short, default_value = "info")]
        severity: String,
        /// 显示时长（毫秒）
        #[arg(long)]
        duration_ms: Option<u64>,
        /// 不自动过期，按 Ctrl-C 关闭
        #[arg(long)]
        persistent: bool,
    },
    /// 记录或查看最近搜索
    Recent {
        /// 要记录的搜索词，省略时只列出
        query: Option<String>,
        /// 清空最近搜索
        #[arg(long)]
        clear: bool,
    },
    /// 连接实时通道，把推送的通知显示为 toast
    Listen {
        /// 实时通道地址，默认取配置中的 realtime_url
        #[arg(long)]
        url: Option<String>,
    },
    /// 打印当前生效的配置
    Config,
}

/// 把 toast 打印到 stderr
struct TerminalRenderer;

impl ToastRenderer for TerminalRenderer {
    fn mount(&self, toast: &Notification) {
        eprintln!("{} {}", toast.severity.icon(), toast.message);
    }

    fn update(&self, toast: &Notification) {
        match toast.progress {
            Some(progress) => eprintln!("   {} ({:.0}%)", toast.message, progress),
            None => eprintln!("   {}", toast.message),
        }
    }

    fn begin_exit(&self, id: &str) {
        debug!(id = %id, "Toast exiting");
    }

    fn detach(&self, id: &str) {
        debug!(id = %id, "Toast detached");
    }

    fn set_position(&self, position: Position) {
        debug!(class = position.class_name(), "Position set");
    }

    fn set_theme(&self, theme: Theme) {
        debug!(class = theme.class_name(), "Theme set");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("storefront_core=info,storefront=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = StorefrontConfig::auto_load();

    let toasts = NotificationManager::new(Arc::new(TerminalRenderer));
    toasts.set_position(config.position);
    toasts.set_theme(config.theme);

    match cli.command {
        Commands::Request {
            endpoint,
            method,
            data,
            offline_for,
        } => {
            let method = Method::parse(&method).ok_or_else(|| anyhow!("Unsupported method: {}", method))?;
            let body = data.map(|d| serde_json::from_str(&d)).transpose()?;

            let platform = Arc::new(StaticPlatform::new(offline_for.is_none()));
            let storage = JsonStorage::new(Arc::new(FileStorage::new(FileStorage::default_path())));
            let client = ApiClient::builder_from_config(&config)
                .storage(storage)
                .platform(platform)
                .notifier(toasts.clone())
                .build()?;

            let mut request_config = RequestConfig::new(method);
            request_config.body = body;

            let pending = {
                let client = client.clone();
                tokio::spawn(async move { client.request(&endpoint, request_config).await })
            };

            if let Some(secs) = offline_for {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                info!(pending = client.pending_requests(), "Going online");
                if let Some(drain) = client.set_connectivity(true) {
                    let report = drain.await?;
                    info!(?report, "Drain finished");
                }
            }

            let response = pending.await??;
            match response.body {
                ResponseBody::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                ResponseBody::Text(text) => println!("{}", text),
                ResponseBody::Empty => println!("HTTP {}", response.status),
            }
        }
        Commands::Toast {
            message,
            severity,
            duration_ms,
            persistent,
        } => {
            let severity = Severity::parse_lossy(&severity);
            let mut options = ShowOptions::new().persistent(persistent);
            if let Some(ms) = duration_ms {
                options = options.duration(Duration::from_millis(ms));
            }
            let window = options
                .duration
                .unwrap_or_else(|| severity.default_duration())
                .saturating_add(EXIT_ANIMATION);
            let id = toasts.show(message, severity, options);
            if persistent {
                tokio::signal::ctrl_c().await?;
                toasts.remove(&id);
                tokio::time::sleep(EXIT_ANIMATION).await;
            } else {
                tokio::time::sleep(window).await;
            }
        }
        Commands::Recent { query, clear } => {
            let storage = JsonStorage::new(Arc::new(FileStorage::new(FileStorage::default_path())));
            let history = SearchHistory::new(storage);
            if clear {
                history.clear_recent();
            }
            if let Some(query) = query {
                history.record(&query);
            }
            for (i, query) in history.recent().iter().enumerate() {
                println!("{:>2}. {}", i + 1, query);
            }
        }
        Commands::Listen { url } => {
            let url = url
                .or_else(|| config.realtime_url.clone())
                .ok_or_else(|| anyhow!("No realtime_url configured, pass --url"))?;
            let connector = StreamConnector::new(config.request_timeout())?;
            let client = RealtimeClient::new(
                url,
                Arc::new(connector),
                toasts.clone(),
                Arc::new(TracingSink),
                config.reconnect.clone(),
            );

            tokio::select! {
                outcome = client.spawn() => {
                    warn!(?outcome, "Realtime channel stopped");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, closing realtime channel");
                }
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
