//! 通知层 - 面向用户的 toast 消息
//!
//! # 组成
//! 1. `NotificationManager`：toast 的创建、过期、移除，以及顺序显示队列
//! 2. `ToastRenderer`：渲染抽象，管理器不关心 toast 最终如何展示
//! 3. `Severity`：决定图标与默认显示时长
//!
//! # 使用示例
//! ```ignore
//! use std::sync::Arc;
//! use storefront_core::notification::{NotificationManager, ShowOptions, TracingRenderer};
//!
//! let toasts = NotificationManager::new(Arc::new(TracingRenderer));
//! let id = toasts.success("Added to cart", ShowOptions::new());
//! toasts.remove(&id);
//! ```

pub mod manager;
pub mod renderer;
pub mod severity;
pub mod toast;

pub use manager::{ConfirmOptions, LoadingHandle, NotificationManager, ProgressHandle, EXIT_ANIMATION};
pub use renderer::{Position, Theme, ToastRenderer, TracingRenderer};
pub use severity::Severity;
pub use toast::{ActionCallback, IdGenerator, Notification, NotificationAction, ShowOptions, ToastState};
