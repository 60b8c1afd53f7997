//! 用户引用（选择器）
//!
//! 文本形式的选择器解析为包含/排除集合，再针对一组用户解析为有序的邮箱或用户列表。
//! 排除总是优先于包含。

pub mod course;
pub mod server;

pub use course::{ParsedCourseUserReference, parse_course_user_references};
pub use server::{ParsedServerUserReference, parse_server_user_references};

pub const EXCLUDE_PREFIX: char = '-';
pub const WILDCARD: &str = "*";

/// 规范化单个选择器，返回 (是否排除, 选择器主体)
pub(crate) fn split_selector(raw: &str) -> (bool, String) {
    let selector = raw.trim().to_lowercase();
    match selector.strip_prefix(EXCLUDE_PREFIX) {
        Some(rest) => (true, rest.trim().to_string()),
        None => (false, selector),
    }
}
