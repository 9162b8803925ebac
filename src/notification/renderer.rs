//! Toast 渲染抽象 - 将 toast 的展示与状态管理解耦
//!
//! 管理器只负责状态（创建、过期、移除），具体如何画出来由 `ToastRenderer` 实现决定：
//! 浏览器 DOM、终端输出或者测试中的记录器。

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::toast::Notification;

/// 容器位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    TopRight,
    TopLeft,
    TopCenter,
    BottomRight,
    BottomLeft,
    BottomCenter,
}

impl Position {
    /// 容器 CSS class
    pub fn class_name(&self) -> &'static str {
        match self {
            Position::TopRight => "notifications--top-right",
            Position::TopLeft => "notifications--top-left",
            Position::TopCenter => "notifications--top-center",
            Position::BottomRight => "notifications--bottom-right",
            Position::BottomLeft => "notifications--bottom-left",
            Position::BottomCenter => "notifications--bottom-center",
        }
    }
}

/// 容器主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn class_name(&self) -> &'static str {
        match self {
            Theme::Light => "notifications--light",
            Theme::Dark => "notifications--dark",
        }
    }
}

/// Toast 渲染器 trait
///
/// 所有方法都是同步的，且不得回调 `NotificationManager`。
pub trait ToastRenderer: Send + Sync {
    /// 新 toast 挂载到容器（淡入动画由实现自行延后一帧）
    fn mount(&self, toast: &Notification);

    /// 文本或进度变化
    fn update(&self, toast: &Notification);

    /// 开始退出动画
    fn begin_exit(&self, id: &str);

    /// 动画结束，从容器中移除
    fn detach(&self, id: &str);

    fn set_position(&self, position: Position);

    fn set_theme(&self, theme: Theme);
}

/// 只写日志的渲染器（无界面环境使用）
#[derive(Debug, Default)]
pub struct TracingRenderer;

impl ToastRenderer for TracingRenderer {
    fn mount(&self, toast: &Notification) {
        info!(
            id = %toast.id,
            severity = %toast.severity,
            persistent = toast.persistent,
            "{} {}",
            toast.severity.icon(),
            toast.message
        );
    }

    fn update(&self, toast: &Notification) {
        debug!(id = %toast.id, progress = ?toast.progress, message = %toast.message, "Toast updated");
    }

    fn begin_exit(&self, id: &str) {
        debug!(id = %id, "Toast exiting");
    }

    fn detach(&self, id: &str) {
        debug!(id = %id, "Toast detached");
    }

    fn set_position(&self, position: Position) {
        debug!(class = position.class_name(), "Container position changed");
    }

    fn set_theme(&self, theme: Theme) {
        debug!(class = theme.class_name(), "Container theme changed");
    }
}
