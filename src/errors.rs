//! 统一错误处理模块
//!
//! 使用宏自动生成错误类型，每个错误携带一个稳定的定位码（locator），
//! 定位码会原样返回给外部调用方。

use std::fmt;

/// 定义错误类型的宏
///
/// 自动生成：
/// - enum 定义
/// - code() 方法 - 返回定位码
/// - error_type() 方法 - 返回错误类型名称
/// - message() 方法 - 返回错误详情
/// - 便捷构造函数
macro_rules! define_autograder_errors {
    ($(
        $variant:ident($code:literal, $type_name:literal)
    ),* $(,)?) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum AutograderError {
            $($variant(String),)*
        }

        impl AutograderError {
            /// 获取定位码
            pub fn code(&self) -> &'static str {
                match self {
                    $(AutograderError::$variant(_) => $code,)*
                }
            }

            /// 获取错误类型名称
            pub fn error_type(&self) -> &'static str {
                match self {
                    $(AutograderError::$variant(_) => $type_name,)*
                }
            }

            /// 获取错误详情
            pub fn message(&self) -> &str {
                match self {
                    $(AutograderError::$variant(msg) => msg,)*
                }
            }

            /// 保持错误类型，替换详情
            fn with_message(&self, msg: String) -> Self {
                match self {
                    $(AutograderError::$variant(_) => AutograderError::$variant(msg),)*
                }
            }
        }

        // 生成便捷构造函数
        paste::paste! {
            impl AutograderError {
                $(
                    pub fn [<$variant:snake>]<T: Into<String>>(msg: T) -> Self {
                        AutograderError::$variant(msg.into())
                    }
                )*
            }
        }
    };
}

define_autograder_errors! {
    Authentication("-012", "Authentication Failure"),
    Authorization("-020", "Authorization Failure"),
    TargetUserAuthorization("-033", "Target User Authorization Failure"),
    InvalidReference("-034", "Invalid Reference"),
    Validation("-041", "Validation Error"),
    NotFound("-042", "Resource Not Found"),
    Storage("-501", "Storage Error"),
    Serialization("-502", "Serialization Error"),
    Config("-503", "Configuration Error"),
    Collaborator("-701", "Collaborator Error"),
    TaskPanic("-702", "Task Panic"),
}

impl AutograderError {
    /// 在错误详情前附加上下文，错误类型不变
    pub fn context<C: fmt::Display>(self, ctx: C) -> Self {
        let msg = format!("{ctx}: {}", self.message());
        self.with_message(msg)
    }

    /// 合并多个错误（批量操作尽力而为时使用）
    ///
    /// 合并后的错误沿用第一个错误的类型，详情以 `"; "` 连接。
    pub fn join(errors: Vec<AutograderError>) -> Option<AutograderError> {
        let first = errors.first()?.clone();
        if errors.len() == 1 {
            return Some(first);
        }

        let msg = errors
            .iter()
            .map(|e| e.message())
            .collect::<Vec<_>>()
            .join("; ");
        Some(first.with_message(msg))
    }

    /// 格式化为彩色输出（用于开发环境）
    #[cfg(debug_assertions)]
    pub fn format_colored(&self) -> String {
        format!(
            "\x1b[1;31m[ERROR]\x1b[0m \x1b[33m{}\x1b[0m \x1b[31m{}\x1b[0m\n  {}",
            self.code(),
            self.error_type(),
            self.message()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for AutograderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for AutograderError {}

// 为常见的错误类型实现 From trait
impl From<std::io::Error> for AutograderError {
    fn from(err: std::io::Error) -> Self {
        AutograderError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AutograderError {
    fn from(err: serde_json::Error) -> Self {
        AutograderError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for AutograderError {
    fn from(err: config::ConfigError) -> Self {
        AutograderError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AutograderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AutograderError::authorization("test").code(), "-020");
        assert_eq!(
            AutograderError::target_user_authorization("test").code(),
            "-033"
        );
        assert_eq!(AutograderError::invalid_reference("test").code(), "-034");
        assert_eq!(AutograderError::storage("test").code(), "-501");
    }

    #[test]
    fn test_error_types() {
        assert_eq!(
            AutograderError::invalid_reference("test").error_type(),
            "Invalid Reference"
        );
        assert_eq!(
            AutograderError::validation("test").error_type(),
            "Validation Error"
        );
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = AutograderError::storage("disk full").context("course101");
        assert_eq!(err.code(), "-501");
        assert_eq!(err.message(), "course101: disk full");
    }

    #[test]
    fn test_join() {
        assert!(AutograderError::join(vec![]).is_none());

        let joined = AutograderError::join(vec![
            AutograderError::storage("a"),
            AutograderError::validation("b"),
        ])
        .unwrap();
        assert_eq!(joined.code(), "-501");
        assert_eq!(joined.message(), "a; b");
    }

    #[test]
    fn test_format_simple() {
        let err = AutograderError::validation("Invalid course id");
        let formatted = err.format_simple();
        assert!(formatted.contains("Validation Error"));
        assert!(formatted.contains("Invalid course id"));
    }
}
