//! 平台能力 - 启动时确定一次，注入到需要的组件
//!
//! 浏览器端的在线状态和页面跳转都通过这个 trait 访问，
//! 组件内部不再临时探测运行环境。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;

/// 平台能力
pub trait Platform: Send + Sync {
    /// 平台报告的当前网络状态
    fn is_online(&self) -> bool;

    /// 跳转到指定路径
    fn navigate(&self, path: &str);
}

/// 无界面环境的平台实现：在线状态可手动切换，跳转只记录日志
#[derive(Debug)]
pub struct StaticPlatform {
    online: AtomicBool,
    navigations: Mutex<Vec<String>>,
}

impl StaticPlatform {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// 已发生的跳转记录
    pub fn navigations(&self) -> Vec<String> {
        self.navigations
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Default for StaticPlatform {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Platform for StaticPlatform {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn navigate(&self, path: &str) {
        info!(path = %path, "Navigating");
        if let Ok(mut navigations) = self.navigations.lock() {
            navigations.push(path.to_string());
        }
    }
}
