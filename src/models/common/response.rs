use serde::Serialize;

// 统一的API响应结构
//
// 失败时 `locator` 为稳定的定位码；没有内容时不输出 `content` 字段。
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub locator: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(content: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            locator: String::new(),
            message: message.into(),
            content: Some(content),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            locator: String::new(),
            message: message.into(),
            content: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error_empty(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            locator: locator.into(),
            message: message.into(),
            content: None,
            timestamp: chrono::Utc::now(),
        }
    }
}
