//! 提交 ID
//!
//! 完整 ID 形如 `<courseID>::<assignmentID>::<userEmail>::<shortID>`，
//! 短 ID 是单调递增整数的十进制表示。

use std::cmp::Ordering;
use std::fmt;

use crate::errors::{AutograderError, Result};
use crate::utils::{normalize_email, validate_id};

pub const ID_DELIM: &str = "::";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullSubmissionId {
    pub course_id: String,
    pub assignment_id: String,
    pub user_email: String,
    pub short_id: String,
}

impl FullSubmissionId {
    pub fn new(course_id: &str, assignment_id: &str, user_email: &str, short_id: &str) -> Self {
        Self {
            course_id: course_id.to_string(),
            assignment_id: assignment_id.to_string(),
            user_email: user_email.to_string(),
            short_id: short_id.to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split(ID_DELIM).collect();
        if parts.len() != 4 {
            return Err(AutograderError::validation(format!(
                "完整提交 ID 必须由 4 段组成: '{raw}'"
            )));
        }

        let user_email = normalize_email(parts[2]);
        if user_email.is_empty() || parts[3].trim().is_empty() {
            return Err(AutograderError::validation(format!(
                "完整提交 ID 含有空段: '{raw}'"
            )));
        }

        Ok(Self {
            course_id: validate_id(parts[0])?,
            assignment_id: validate_id(parts[1])?,
            user_email,
            short_id: parts[3].trim().to_string(),
        })
    }
}

impl fmt::Display for FullSubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{ID_DELIM}{}{ID_DELIM}{}{ID_DELIM}{}",
            self.course_id, self.assignment_id, self.user_email, self.short_id
        )
    }
}

/// 从 `target-submission` 输入中取短 ID：接受完整 ID 或裸短 ID
pub fn short_id_from_target(target: &str) -> String {
    let target = target.trim();
    match target.rfind(ID_DELIM) {
        Some(index) => target[index + ID_DELIM.len()..].to_string(),
        None => target.to_string(),
    }
}

/// 短 ID 的排序：先比较长度再比较字典序
///
/// 等长时与字典序一致，不等长时仍保持数值顺序。
pub fn compare_short_ids(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
