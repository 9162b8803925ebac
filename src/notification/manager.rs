//! Toast 管理器 - 管理 toast 的创建、过期、移除以及顺序队列
//!
//! # 生命周期
//! `show` → 挂载显示 → (`remove` / 过期 / `clear`) → 退出动画 → 300ms 后 detach
//!
//! # 过期
//! 不再每秒轮询：所有非 persistent toast 的截止时间放在一个最小堆里，
//! 后台任务只睡到最早的截止时间。堆里可能残留已被手动移除的 ID，
//! 因为 `remove` 是幂等的，这些残留会被直接忽略。
//!
//! 管理器必须在 tokio runtime 内创建。

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, trace};

use super::renderer::{Position, Theme, ToastRenderer};
use super::severity::Severity;
use super::toast::{
    clamp_progress, IdGenerator, Notification, NotificationAction, ShowOptions, ToastState,
};

/// 退出动画时长
pub const EXIT_ANIMATION: Duration = Duration::from_millis(300);

/// `confirm` 的可选参数
#[derive(Debug, Clone)]
pub struct ConfirmOptions {
    pub confirm_label: String,
    pub cancel_label: String,
    pub severity: Severity,
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        Self {
            confirm_label: "Confirm".to_string(),
            cancel_label: "Cancel".to_string(),
            severity: Severity::Warning,
        }
    }
}

type ConfirmSlot = Arc<Mutex<Option<oneshot::Sender<bool>>>>;

/// 顺序队列中等待显示的 toast
struct QueuedToast {
    message: String,
    severity: Severity,
    options: ShowOptions,
    responder: oneshot::Sender<String>,
}

#[derive(Default)]
struct ManagerState {
    /// 按创建顺序排列
    toasts: Vec<Notification>,
    deadlines: BinaryHeap<Reverse<(Instant, String)>>,
    queue: VecDeque<QueuedToast>,
    /// 未应答的 confirm toast，detach 时以 `false` 应答
    confirms: HashMap<String, ConfirmSlot>,
    /// 是否有队列 toast 正在显示
    queue_busy: bool,
    position: Position,
    theme: Theme,
}

struct Inner {
    renderer: Arc<dyn ToastRenderer>,
    ids: IdGenerator,
    state: Mutex<ManagerState>,
    expiry_wake: Arc<Notify>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        for slot in state.confirms.values() {
            resolve(slot, false);
        }
        // 唤醒过期任务，让它发现管理器已释放后退出
        self.expiry_wake.notify_one();
    }
}

/// Toast 管理器
///
/// `Clone` 得到的是同一个管理器的另一个句柄。
#[derive(Clone)]
pub struct NotificationManager {
    inner: Arc<Inner>,
}

impl NotificationManager {
    /// 创建管理器并启动过期任务
    pub fn new(renderer: Arc<dyn ToastRenderer>) -> Self {
        let inner = Arc::new(Inner {
            renderer,
            ids: IdGenerator::new(),
            state: Mutex::new(ManagerState::default()),
            expiry_wake: Arc::new(Notify::new()),
        });

        tokio::spawn(run_expiry(
            Arc::downgrade(&inner),
            inner.expiry_wake.clone(),
        ));

        Self { inner }
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state()
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    /// 创建并显示 toast，返回 ID
    pub fn show(&self, message: impl Into<String>, severity: Severity, options: ShowOptions) -> String {
        let id = self.inner.ids.next_id();
        let toast = Notification::new(id.clone(), message.into(), severity, options);

        {
            let mut state = self.state();
            if let Some(deadline) = toast.expires_at() {
                state.deadlines.push(Reverse((deadline, id.clone())));
            }
            state.toasts.push(toast.clone());
        }
        self.inner.expiry_wake.notify_one();

        debug!(id = %id, severity = %severity, duration_ms = toast.duration.as_millis() as u64, persistent = toast.persistent, "Toast shown");
        self.inner.renderer.mount(&toast);
        id
    }

    pub fn success(&self, message: impl Into<String>, options: ShowOptions) -> String {
        self.show(message, Severity::Success, options)
    }

    pub fn error(&self, message: impl Into<String>, options: ShowOptions) -> String {
        self.show(message, Severity::Error, options)
    }

    pub fn warning(&self, message: impl Into<String>, options: ShowOptions) -> String {
        self.show(message, Severity::Warning, options)
    }

    pub fn info(&self, message: impl Into<String>, options: ShowOptions) -> String {
        self.show(message, Severity::Info, options)
    }

    /// 移除 toast（幂等）
    ///
    /// 返回 `true` 表示本次调用触发了退出；未知 ID 或已在退出中返回 `false`。
    pub fn remove(&self, id: &str) -> bool {
        let started = {
            let mut state = self.state();
            match state.toasts.iter_mut().find(|t| t.id == id && t.is_displayed()) {
                Some(toast) => {
                    toast.state = ToastState::Exiting;
                    true
                }
                None => false,
            }
        };

        if !started {
            trace!(id = %id, "Remove ignored, toast not displayed");
            return false;
        }

        self.inner.renderer.begin_exit(id);

        let weak = self.downgrade();
        let id = id.to_string();
        tokio::spawn(async move {
            sleep(EXIT_ANIMATION).await;
            if let Some(inner) = weak.upgrade() {
                inner.detach(&id);
            }
        });
        true
    }

    /// 移除所有正在显示的 toast
    pub fn clear(&self) {
        let ids = self.live_ids();
        debug!(count = ids.len(), "Clearing toasts");
        for id in ids {
            self.remove(&id);
        }
    }

    /// 触发 toast 上的第 `index` 个动作
    pub fn invoke_action(&self, id: &str, index: usize) -> bool {
        let action = {
            let state = self.state();
            state
                .toasts
                .iter()
                .find(|t| t.id == id && t.is_displayed())
                .and_then(|t| t.actions.get(index).cloned())
        };

        let Some(action) = action else {
            return false;
        };

        debug!(id = %id, label = %action.label, "Toast action invoked");
        action.invoke();
        if action.dismiss {
            self.remove(id);
        }
        true
    }

    /// 显示确认 toast，用户点击确认返回 `true`，取消或 toast 被其他方式移除返回 `false`
    ///
    /// toast 在调用时立即显示，不依赖返回的 future 被 poll。
    pub fn confirm(
        &self,
        message: impl Into<String>,
        options: ConfirmOptions,
    ) -> impl Future<Output = bool> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let slot: ConfirmSlot = Arc::new(Mutex::new(Some(tx)));
        let confirm_slot = slot.clone();
        let cancel_slot = slot.clone();

        let show_options = ShowOptions::new()
            .persistent(true)
            .action(
                NotificationAction::new(options.confirm_label, move || resolve(&confirm_slot, true))
                    .dismissing(),
            )
            .action(
                NotificationAction::new(options.cancel_label, move || resolve(&cancel_slot, false))
                    .dismissing(),
            );

        let id = self.show(message, options.severity, show_options);
        self.state().confirms.insert(id, slot);

        async move { rx.await.unwrap_or(false) }
    }

    /// 显示 loading toast（persistent），返回可更新文本或关闭的句柄
    pub fn loading(&self, message: impl Into<String>) -> LoadingHandle {
        let id = self.show(message, Severity::Info, ShowOptions::new().persistent(true));
        LoadingHandle {
            manager: self.clone(),
            id,
        }
    }

    /// 显示进度 toast，初始进度限制在 [0, 100]
    pub fn progress(&self, message: impl Into<String>, initial: f64) -> ProgressHandle {
        let id = self.show(message, Severity::Info, ShowOptions::new().persistent(true));
        self.update(&id, None, Some(initial));
        ProgressHandle {
            manager: self.clone(),
            id,
        }
    }

    /// 加入顺序队列，同一时间最多显示一条队列 toast
    ///
    /// 返回的 future 在这条 toast 的显示窗口（duration + 退出动画）结束后完成，
    /// 而不是在被提前关闭时完成。管理器在显示前被释放时返回 `None`。
    pub fn show_queued(
        &self,
        message: impl Into<String>,
        severity: Severity,
        options: ShowOptions,
    ) -> impl Future<Output = Option<String>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state();
            state.queue.push_back(QueuedToast {
                message: message.into(),
                severity,
                options,
                responder: tx,
            });
            debug!(pending = state.queue.len(), "Toast queued");
        }
        self.process_queue();

        async move { rx.await.ok() }
    }

    /// 队列空闲时取出队首并显示，显示窗口结束后继续处理下一条
    fn process_queue(&self) {
        let next = {
            let mut state = self.state();
            if state.queue_busy {
                return;
            }
            match state.queue.pop_front() {
                Some(next) => {
                    state.queue_busy = true;
                    next
                }
                None => return,
            }
        };

        let QueuedToast {
            message,
            severity,
            options,
            responder,
        } = next;
        let window = options
            .duration
            .unwrap_or_else(|| severity.default_duration())
            .saturating_add(EXIT_ANIMATION);
        let id = self.show(message, severity, options);

        let weak = self.downgrade();
        tokio::spawn(async move {
            sleep(window).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = NotificationManager { inner };
            // persistent 的队列 toast 也在窗口结束时移除，保证同时只显示一条
            manager.remove(&id);
            manager.state().queue_busy = false;
            let _ = responder.send(id);
            manager.process_queue();
        });
    }

    fn update(&self, id: &str, message: Option<String>, progress: Option<f64>) -> bool {
        let updated = {
            let mut state = self.state();
            state
                .toasts
                .iter_mut()
                .find(|t| t.id == id && t.is_displayed())
                .map(|toast| {
                    if let Some(message) = message {
                        toast.message = message;
                    }
                    if let Some(progress) = progress {
                        toast.progress = Some(clamp_progress(progress));
                    }
                    toast.clone()
                })
        };

        match updated {
            Some(toast) => {
                self.inner.renderer.update(&toast);
                true
            }
            None => false,
        }
    }

    pub fn set_position(&self, position: Position) {
        self.state().position = position;
        self.inner.renderer.set_position(position);
    }

    pub fn set_theme(&self, theme: Theme) {
        self.state().theme = theme;
        self.inner.renderer.set_theme(theme);
    }

    pub fn position(&self) -> Position {
        self.state().position
    }

    pub fn theme(&self) -> Theme {
        self.state().theme
    }

    /// 正在显示（未进入退出动画）的 toast ID，按创建顺序
    pub fn live_ids(&self) -> Vec<String> {
        self.state()
            .toasts
            .iter()
            .filter(|t| t.is_displayed())
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.state().toasts.iter().find(|t| t.id == id).cloned()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.state().toasts.iter().any(|t| t.id == id && t.is_displayed())
    }

    pub fn len(&self) -> usize {
        self.state().toasts.iter().filter(|t| t.is_displayed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 队列中尚未显示的 toast 数量
    pub fn queued_len(&self) -> usize {
        self.state().queue.len()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn detach(&self, id: &str) {
        let (detached, confirm) = {
            let mut state = self.state();
            let before = state.toasts.len();
            state.toasts.retain(|t| !(t.id == id && t.state == ToastState::Exiting));
            if before == state.toasts.len() {
                (false, None)
            } else {
                (true, state.confirms.remove(id))
            }
        };
        if let Some(slot) = confirm {
            // 已点击过按钮时 slot 为空，这里不会覆盖结果
            resolve(&slot, false);
        }
        if detached {
            self.renderer.detach(id);
        }
    }

    /// 弹出所有已到期的截止时间，返回需要移除的 ID 和下一个截止时间
    fn take_expired(&self, now: Instant) -> (Vec<String>, Option<Instant>) {
        let mut state = self.state();
        let mut expired = Vec::new();

        while let Some(Reverse((deadline, _))) = state.deadlines.peek() {
            if *deadline > now {
                break;
            }
            if let Some(Reverse((_, id))) = state.deadlines.pop() {
                let due = state
                    .toasts
                    .iter()
                    .any(|t| t.id == id && t.is_displayed() && t.is_expired(now));
                if due {
                    expired.push(id);
                }
            }
        }

        let next = state.deadlines.peek().map(|Reverse((deadline, _))| *deadline);
        (expired, next)
    }
}

fn resolve(slot: &Mutex<Option<oneshot::Sender<bool>>>, value: bool) {
    let sender = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(sender) = sender {
        let _ = sender.send(value);
    }
}

/// 过期任务：睡到最早的截止时间，或被新 toast 唤醒
async fn run_expiry(weak: Weak<Inner>, wake: Arc<Notify>) {
    loop {
        let next = {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let (expired, next) = inner.take_expired(Instant::now());
            if !expired.is_empty() {
                let manager = NotificationManager { inner };
                for id in &expired {
                    debug!(id = %id, "Toast expired");
                    manager.remove(id);
                }
            }
            next
        };

        match next {
            Some(deadline) => {
                tokio::select! {
                    _ = sleep_until(deadline) => {}
                    _ = wake.notified() => {}
                }
            }
            None => wake.notified().await,
        }
    }
}

/// Loading toast 句柄
///
/// 关闭句柄只移除 toast，不会取消调用方关联的任何网络请求。
#[derive(Clone)]
pub struct LoadingHandle {
    manager: NotificationManager,
    id: String,
}

impl LoadingHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn update(&self, message: impl Into<String>) -> bool {
        self.manager.update(&self.id, Some(message.into()), None)
    }

    pub fn close(&self) -> bool {
        self.manager.remove(&self.id)
    }
}

/// 进度 toast 句柄
#[derive(Clone)]
pub struct ProgressHandle {
    manager: NotificationManager,
    id: String,
}

impl ProgressHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 更新进度（限制在 [0, 100]），可同时更新文本
    pub fn update(&self, progress: f64, message: Option<&str>) -> bool {
        self.manager
            .update(&self.id, message.map(str::to_string), Some(progress))
    }

    pub fn close(&self) -> bool {
        self.manager.remove(&self.id)
    }
}
