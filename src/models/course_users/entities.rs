use serde::{Deserialize, Serialize};

use crate::errors::{AutograderError, Result};
use crate::utils::validate_email;

// 课程角色，按权限从低到高排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CourseUserRole {
    Unknown = 0, // 未知（仅作为校验失败的占位）
    Other = 10,  // 旁听等其他身份
    Student = 20,
    Grader = 30,
    Admin = 40,
    Owner = 50,
}

impl CourseUserRole {
    pub const UNKNOWN: &'static str = "unknown";
    pub const OTHER: &'static str = "other";
    pub const STUDENT: &'static str = "student";
    pub const GRADER: &'static str = "grader";
    pub const ADMIN: &'static str = "admin";
    pub const OWNER: &'static str = "owner";

    /// 通配符 `*` 展开后的角色集合（不含 unknown）
    pub fn common_roles() -> &'static [CourseUserRole] {
        &[
            Self::Other,
            Self::Student,
            Self::Grader,
            Self::Admin,
            Self::Owner,
        ]
    }

    pub fn value(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CourseUserRole::Unknown => Self::UNKNOWN,
            CourseUserRole::Other => Self::OTHER,
            CourseUserRole::Student => Self::STUDENT,
            CourseUserRole::Grader => Self::GRADER,
            CourseUserRole::Admin => Self::ADMIN,
            CourseUserRole::Owner => Self::OWNER,
        }
    }
}

impl Serialize for CourseUserRole {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CourseUserRole {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            serde::de::Error::custom(format!(
                "无效的课程角色: '{s}'. 支持的角色: other, student, grader, admin, owner"
            ))
        })
    }
}

impl std::fmt::Display for CourseUserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CourseUserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            CourseUserRole::UNKNOWN => Ok(CourseUserRole::Unknown),
            CourseUserRole::OTHER => Ok(CourseUserRole::Other),
            CourseUserRole::STUDENT => Ok(CourseUserRole::Student),
            CourseUserRole::GRADER => Ok(CourseUserRole::Grader),
            CourseUserRole::ADMIN => Ok(CourseUserRole::Admin),
            CourseUserRole::OWNER => Ok(CourseUserRole::Owner),
            _ => Err(format!("Invalid course user role: {s}")),
        }
    }
}

// 课程成员视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CourseUser {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: CourseUserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lms_id: Option<String>,
}

impl CourseUser {
    pub fn validate(&mut self) -> Result<()> {
        self.email = validate_email(&self.email)?;
        if self.role == CourseUserRole::Unknown {
            return Err(AutograderError::validation(format!(
                "课程成员 '{}' 的角色不能为 unknown",
                self.email
            )));
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}
