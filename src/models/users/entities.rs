use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::errors::{AutograderError, Result};
use crate::models::course_users::entities::{CourseUser, CourseUserRole};
use crate::models::tokens::entities::Token;
use crate::utils::validate::is_lower_hex;
use crate::utils::{validate_email, validate_id};

// 服务器角色，按权限从低到高排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServerUserRole {
    Unknown = 0,
    User = 10,    // 普通用户
    Creator = 20, // 可以创建课程
    Admin = 30,   // 管理员
    Owner = 40,   // 服务器所有者
    Root = 50,    // 仅用于系统内部发起的操作，不对应真实用户
}

impl ServerUserRole {
    pub const UNKNOWN: &'static str = "unknown";
    pub const USER: &'static str = "user";
    pub const CREATOR: &'static str = "creator";
    pub const ADMIN: &'static str = "admin";
    pub const OWNER: &'static str = "owner";
    pub const ROOT: &'static str = "root";

    /// 通配符 `*` 展开后的角色集合（不含 unknown 与 root）
    pub fn common_roles() -> &'static [ServerUserRole] {
        &[Self::User, Self::Creator, Self::Admin, Self::Owner]
    }

    pub fn value(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerUserRole::Unknown => Self::UNKNOWN,
            ServerUserRole::User => Self::USER,
            ServerUserRole::Creator => Self::CREATOR,
            ServerUserRole::Admin => Self::ADMIN,
            ServerUserRole::Owner => Self::OWNER,
            ServerUserRole::Root => Self::ROOT,
        }
    }
}

impl Serialize for ServerUserRole {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServerUserRole {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            serde::de::Error::custom(format!(
                "无效的服务器角色: '{s}'. 支持的角色: user, creator, admin, owner"
            ))
        })
    }
}

impl std::fmt::Display for ServerUserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ServerUserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            ServerUserRole::UNKNOWN => Ok(ServerUserRole::Unknown),
            ServerUserRole::USER => Ok(ServerUserRole::User),
            ServerUserRole::CREATOR => Ok(ServerUserRole::Creator),
            ServerUserRole::ADMIN => Ok(ServerUserRole::Admin),
            ServerUserRole::OWNER => Ok(ServerUserRole::Owner),
            ServerUserRole::ROOT => Ok(ServerUserRole::Root),
            _ => Err(format!("Invalid server user role: {s}")),
        }
    }
}

// 用户在某门课程中的信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserCourseInfo {
    pub role: CourseUserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lms_id: Option<String>,
}

// 服务器用户实体（users.json 中的一项）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerUser {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: ServerUserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub course_info: BTreeMap<String, UserCourseInfo>,
}

impl ServerUser {
    pub fn new(email: &str, role: ServerUserRole) -> Self {
        Self {
            email: email.to_string(),
            name: None,
            role,
            salt: None,
            tokens: Vec::new(),
            course_info: BTreeMap::new(),
        }
    }

    /// 根用户：系统内部操作使用的身份
    pub fn root() -> Self {
        Self::new("root", ServerUserRole::Root)
    }

    /// 校验并规范化用户
    ///
    /// 令牌去重并排序；课程 ID 规范化为小写。
    pub fn validate(&mut self) -> Result<()> {
        self.email = validate_email(&self.email)?;

        if self.role == ServerUserRole::Unknown {
            return Err(AutograderError::validation(format!(
                "用户 '{}' 的服务器角色不能为 unknown",
                self.email
            )));
        }

        if let Some(salt) = &self.salt
            && !is_lower_hex(salt)
        {
            return Err(AutograderError::validation(format!(
                "用户 '{}' 的盐必须是小写十六进制串",
                self.email
            )));
        }

        for token in &self.tokens {
            token.validate()?;
        }
        self.tokens.sort();
        self.tokens.dedup();

        let mut course_info = BTreeMap::new();
        for (course_id, info) in std::mem::take(&mut self.course_info) {
            let course_id = validate_id(&course_id)?;
            if info.role == CourseUserRole::Unknown {
                return Err(AutograderError::validation(format!(
                    "用户 '{}' 在课程 '{}' 中的角色不能为 unknown",
                    self.email, course_id
                )));
            }
            course_info.insert(course_id, info);
        }
        self.course_info = course_info;

        Ok(())
    }

    /// 用户在课程中的有效角色
    ///
    /// 服务器 admin 及以上在所有课程中视为 owner；未加入课程时为 unknown。
    pub fn effective_course_role(&self, course_id: &str) -> CourseUserRole {
        if self.role >= ServerUserRole::Admin {
            return CourseUserRole::Owner;
        }

        self.course_info
            .get(course_id)
            .map(|info| info.role)
            .unwrap_or(CourseUserRole::Unknown)
    }

    /// 转换为课程成员视图；未加入该课程时返回 None
    pub fn to_course_user(&self, course_id: &str) -> Option<CourseUser> {
        let info = self.course_info.get(course_id)?;
        Some(CourseUser {
            email: self.email.clone(),
            name: self.name.clone(),
            role: info.role,
            lms_id: info.lms_id.clone(),
        })
    }

    /// 合并另一份用户数据
    ///
    /// 对方存在的标量字段覆盖本方；课程信息逐课程覆盖。
    /// 本方已有令牌时盐保持不变，对方用不同盐生成的令牌无法校验，直接丢弃。
    pub fn merge(&mut self, other: ServerUser) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.role != ServerUserRole::Unknown {
            self.role = other.role;
        }

        let keeps_salt = self.salt.is_some() && !self.tokens.is_empty();
        if !keeps_salt {
            if other.salt.is_some() {
                self.salt = other.salt;
            }
            self.tokens.extend(other.tokens);
        } else if other.salt.is_none() || other.salt == self.salt {
            self.tokens.extend(other.tokens);
        } else if !other.tokens.is_empty() {
            warn!(
                "用户 '{}' 已有盐，丢弃 {} 个以其它盐生成的令牌",
                self.email,
                other.tokens.len()
            );
        }
        self.tokens.sort();
        self.tokens.dedup();

        self.course_info.extend(other.course_info);
    }

    /// 查找摘要匹配的令牌并刷新其访问时间
    pub fn touch_token(&mut self, digest: &str) -> bool {
        match self.tokens.iter_mut().find(|token| token.matches(digest)) {
            Some(token) => {
                token.access_time = Utc::now();
                true
            }
            None => false,
        }
    }
}
