//! Toast 数据模型

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::severity::Severity;

/// 动作回调
pub type ActionCallback = Arc<dyn Fn() + Send + Sync>;

/// 可交互动作（按钮）
#[derive(Clone)]
pub struct NotificationAction {
    /// 按钮文本
    pub label: String,
    /// 触发后是否移除 toast
    pub dismiss: bool,
    callback: ActionCallback,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            dismiss: false,
            callback: Arc::new(callback),
        }
    }

    /// 触发后自动移除 toast
    pub fn dismissing(mut self) -> Self {
        self.dismiss = true;
        self
    }

    pub(crate) fn invoke(&self) {
        (self.callback)()
    }
}

impl fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .field("dismiss", &self.dismiss)
            .finish_non_exhaustive()
    }
}

/// `show` 的可选参数
#[derive(Debug, Clone, Default)]
pub struct ShowOptions {
    /// 显示时长，未设置时按 severity 取默认值
    pub duration: Option<Duration>,
    /// 不自动过期
    pub persistent: bool,
    pub actions: Vec<NotificationAction>,
}

impl ShowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// Toast 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastState {
    /// 正在显示
    Displayed,
    /// 退出动画中，等待 detach
    Exiting,
}

/// 单条 toast
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub severity: Severity,
    /// 单调时钟，用于过期判断
    pub created_at: Instant,
    /// 墙钟时间，用于展示
    pub created_ts: DateTime<Utc>,
    pub duration: Duration,
    pub persistent: bool,
    pub actions: Vec<NotificationAction>,
    /// 进度条数值（0-100），仅 progress toast 有
    pub progress: Option<f64>,
    pub state: ToastState,
}

impl Notification {
    pub(crate) fn new(id: String, message: String, severity: Severity, options: ShowOptions) -> Self {
        Self {
            id,
            message,
            severity,
            created_at: Instant::now(),
            created_ts: Utc::now(),
            duration: options.duration.unwrap_or_else(|| severity.default_duration()),
            persistent: options.persistent,
            actions: options.actions,
            progress: None,
            state: ToastState::Displayed,
        }
    }

    /// 自动过期时间点
    ///
    /// persistent 或时长大到无法表示的 toast 返回 None，永不自动过期。
    pub fn expires_at(&self) -> Option<Instant> {
        if self.persistent {
            None
        } else {
            self.created_at.checked_add(self.duration)
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|deadline| now >= deadline)
    }

    pub fn is_displayed(&self) -> bool {
        self.state == ToastState::Displayed
    }
}

/// Toast ID 生成器
///
/// ID 格式为 `toast-<毫秒时间戳>-<序号>`，序号单调递增，同一个生成器不会产生重复 ID。
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("toast-{}-{}", Utc::now().timestamp_millis(), seq)
    }
}

/// 进度值限制在 [0, 100]，NaN 视为 0
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_generator_never_repeats() {
        let ids = IdGenerator::new();
        let generated: HashSet<String> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 1000);
    }

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(-5.0), 0.0);
        assert_eq!(clamp_progress(42.5), 42.5);
        assert_eq!(clamp_progress(250.0), 100.0);
        assert_eq!(clamp_progress(f64::NAN), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_defaults_by_severity() {
        let toast = Notification::new(
            "toast-1".to_string(),
            "Saved".to_string(),
            Severity::Warning,
            ShowOptions::new(),
        );
        assert_eq!(toast.duration, Duration::from_millis(4000));
        assert_eq!(toast.expires_at(), Some(toast.created_at + Duration::from_millis(4000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_never_expires() {
        let toast = Notification::new(
            "toast-2".to_string(),
            "Uploading".to_string(),
            Severity::Info,
            ShowOptions::new().persistent(true),
        );
        assert!(toast.expires_at().is_none());
        assert!(!toast.is_expired(Instant::now() + Duration::from_secs(3600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_deadline_never_expires() {
        let toast = Notification::new(
            "toast-3".to_string(),
            "Forever".to_string(),
            Severity::Info,
            ShowOptions::new().duration(Duration::MAX),
        );
        assert!(toast.expires_at().is_none());
        assert!(!toast.is_expired(Instant::now() + Duration::from_secs(86_400 * 365)));
    }

    #[test]
    fn test_action_invoke() {
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let action = NotificationAction::new("Undo", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        action.invoke();
        action.invoke();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!action.dismiss);
        assert!(action.dismissing().dismiss);
    }
}
