//! 请求与响应类型

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::ApiError;

/// HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// 大小写不敏感解析
    pub fn parse(value: &str) -> Option<Method> {
        match value.to_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 单次请求配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// 离线失败时进入队列（默认开启），关闭后直接返回网络错误
    #[serde(default = "default_true")]
    pub queue_if_offline: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method: Method::Get,
            headers: BTreeMap::new(),
            body: None,
            queue_if_offline: true,
        }
    }
}

impl RequestConfig {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 关闭离线排队
    pub fn no_queue(mut self) -> Self {
        self.queue_if_offline = false;
        self
    }
}

/// 发往 transport 的完整请求
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

/// 响应体：JSON 响应解析为 Value，其他内容保留原始文本
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Empty,
}

impl ResponseBody {
    /// 按 content-type 解析响应体，JSON 解析失败时退回文本
    pub fn parse(content_type: Option<&str>, raw: String) -> Self {
        if raw.is_empty() {
            return ResponseBody::Empty;
        }
        let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));
        if is_json {
            match serde_json::from_str(&raw) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Text(raw),
            }
        } else {
            ResponseBody::Text(raw)
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            ResponseBody::Json(value) => value.to_string(),
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::Empty => String::new(),
        }
    }
}

/// HTTP 响应
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            body: ResponseBody::Json(value),
        }
    }

    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            body: ResponseBody::Text(text.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 将 JSON 响应体反序列化为目标类型
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        match &self.body {
            ResponseBody::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|e| ApiError::Decode(e.to_string()))
            }
            ResponseBody::Text(text) => {
                serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
            }
            ResponseBody::Empty => serde_json::from_value(serde_json::Value::Null)
                .map_err(|e| ApiError::Decode(e.to_string())),
        }
    }
}
