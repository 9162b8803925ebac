//! Storefront Core - 商城前端的 toast 管理与离线感知 API 客户端

pub mod api;
pub mod config;
pub mod notification;
pub mod platform;
pub mod realtime;
pub mod storage;

pub use api::{with_retry, ApiClient, ApiError, ApiResponse, Connectivity, DrainReport, Method, RequestConfig};
pub use config::{ReconnectConfig, StorefrontConfig};
pub use notification::{
    ConfirmOptions, NotificationManager, Position, Severity, ShowOptions, Theme, ToastRenderer,
    TracingRenderer,
};
pub use platform::{Platform, StaticPlatform};
pub use realtime::{
    EventSink, FrameDecoder, RealtimeClient, RealtimeConnector, RealtimeMessage, StreamConnector,
    TracingSink,
};
pub use storage::{FileStorage, JsonStorage, KeyValueStorage, MemoryStorage, SearchHistory};
