use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{AutograderError, Result};

static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("Invalid identifier regex"));

static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]+$").expect("Invalid hex regex"));

/// 校验并规范化课程、作业、任务 ID
///
/// ID 大小写不敏感，统一转为小写；只允许 ASCII 字母数字、`-` 与 `_`。
pub fn validate_id(id: &str) -> Result<String> {
    let id = id.trim().to_lowercase();
    if id.is_empty() {
        return Err(AutograderError::validation("IDs must not be empty"));
    }
    if !ID_RE.is_match(&id) {
        return Err(AutograderError::validation(format!(
            "IDs must only contain alphanumerics, '-' or '_', found '{id}'"
        )));
    }
    Ok(id)
}

/// 规范化邮箱：去除首尾空白并转为小写
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 邮箱只要求包含 `@`，其余格式不做校验
pub fn is_email(value: &str) -> bool {
    value.contains('@')
}

pub fn validate_email(email: &str) -> Result<String> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AutograderError::validation("Email must not be empty"));
    }
    Ok(email)
}

/// 非空的小写十六进制串
pub fn is_lower_hex(value: &str) -> bool {
    HEX_RE.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id_normalizes() {
        assert_eq!(validate_id(" Course101 ").unwrap(), "course101");
        assert_eq!(validate_id("hw_0-a").unwrap(), "hw_0-a");
    }

    #[test]
    fn test_validate_id_rejects() {
        assert!(validate_id("").is_err());
        assert!(validate_id("   ").is_err());
        assert!(validate_id("a::b").is_err());
        assert!(validate_id("hw 0").is_err());
        assert!(validate_id("hw.0").is_err());
    }

    #[test]
    fn test_email_helpers() {
        assert_eq!(normalize_email("  Student@Test.COM "), "student@test.com");
        assert!(is_email("a@b"));
        assert!(!is_email("student"));
        assert!(validate_email("   ").is_err());
    }

    #[test]
    fn test_is_lower_hex() {
        assert!(is_lower_hex("00ff"));
        assert!(!is_lower_hex("00FF"));
        assert!(!is_lower_hex(""));
        assert!(!is_lower_hex("xyz"));
    }
}
