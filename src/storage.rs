//! 键值存储 - 浏览器 local storage 的抽象
//!
//! 底层存储可能失败（配额超限、存储被禁用、文件损坏），
//! 但 `JsonStorage` 的访问器绝不向调用方抛出错误：失败时记录日志并返回默认值。

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// 登录凭证
pub const AUTH_TOKEN_KEY: &str = "authToken";
/// 最近搜索
pub const RECENT_SEARCHES_KEY: &str = "recentSearches";
/// 收藏的搜索
pub const SAVED_SEARCHES_KEY: &str = "savedSearches";
/// 购物车
pub const CART_KEY: &str = "cart";

/// 最近搜索最多保留条数
const MAX_RECENT_SEARCHES: usize = 10;

/// 原始键值存储
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// 内存存储，可设置容量上限模拟配额
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入后总字节数超过 `quota_bytes` 时写入失败
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("storage lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("storage lock poisoned"))?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(anyhow!("storage quota exceeded ({} bytes)", quota));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("storage lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// 文件存储 - 单个 JSON 对象文件（带文件锁，临时文件 + rename 原子替换）
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认存储路径 `~/.config/storefront/storage.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("storefront")
            .join("storage.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn read_map(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let mut content = String::new();
        File::open(&self.path)?.read_to_string(&mut content)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("corrupt storage file {}", self.path.display()))
    }

    /// 加锁后读-改-写
    fn modify(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        let result = (|| -> Result<()> {
            let mut map = self.read_map()?;
            f(&mut map);

            let temp_path = self.path.with_extension("tmp");
            {
                let mut temp = File::create(&temp_path)?;
                temp.write_all(serde_json::to_string(&map)?.as_bytes())?;
                temp.sync_all()?;
            }
            fs::rename(&temp_path, &self.path)?;
            Ok(())
        })();

        lock.unlock()?;
        result
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.modify(|map| {
            map.remove(key);
        })
    }
}

/// JSON 访问器 - 所有失败都在这里吞掉并记录
#[derive(Clone)]
pub struct JsonStorage {
    backend: Arc<dyn KeyValueStorage>,
}

impl JsonStorage {
    pub fn new(backend: Arc<dyn KeyValueStorage>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// 读取并反序列化，缺失、读取失败或 JSON 损坏时返回 `fallback`
    pub fn read_or<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.backend.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "Corrupt JSON in storage, using fallback");
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage read failed, using fallback");
                fallback
            }
        }
    }

    /// 序列化并写入，返回是否成功
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize storage value");
                return false;
            }
        };
        self.write_raw(key, &raw)
    }

    /// 读取原始字符串（如 `authToken`）
    pub fn read_raw(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage read failed");
                None
            }
        }
    }

    pub fn write_raw(&self, key: &str, value: &str) -> bool {
        match self.backend.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage write failed");
                false
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Storage remove failed");
                false
            }
        }
    }

    pub fn auth_token(&self) -> Option<String> {
        self.read_raw(AUTH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn set_auth_token(&self, token: &str) -> bool {
        self.write_raw(AUTH_TOKEN_KEY, token)
    }

    pub fn clear_auth_token(&self) -> bool {
        self.remove(AUTH_TOKEN_KEY)
    }
}

/// 搜索历史 - 最近搜索与收藏搜索
#[derive(Clone)]
pub struct SearchHistory {
    storage: JsonStorage,
}

impl SearchHistory {
    pub fn new(storage: JsonStorage) -> Self {
        Self { storage }
    }

    /// 记录一次搜索：去重（忽略大小写）、最新在前、最多 10 条
    pub fn record(&self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        let mut recent = self.recent();
        recent.retain(|q| !q.eq_ignore_ascii_case(query));
        recent.insert(0, query.to_string());
        recent.truncate(MAX_RECENT_SEARCHES);
        self.storage.write(RECENT_SEARCHES_KEY, &recent);
    }

    pub fn recent(&self) -> Vec<String> {
        self.storage.read_or(RECENT_SEARCHES_KEY, Vec::new())
    }

    pub fn clear_recent(&self) {
        self.storage.remove(RECENT_SEARCHES_KEY);
    }

    /// 收藏搜索，已存在时不重复添加
    pub fn save(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }
        let mut saved = self.saved();
        if saved.iter().any(|q| q == query) {
            return false;
        }
        saved.push(query.to_string());
        self.storage.write(SAVED_SEARCHES_KEY, &saved)
    }

    pub fn saved(&self) -> Vec<String> {
        self.storage.read_or(SAVED_SEARCHES_KEY, Vec::new())
    }

    pub fn unsave(&self, query: &str) -> bool {
        let mut saved = self.saved();
        let before = saved.len();
        saved.retain(|q| q != query);
        before != saved.len() && self.storage.write(SAVED_SEARCHES_KEY, &saved)
    }
}
