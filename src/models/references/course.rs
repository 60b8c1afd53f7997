use std::collections::BTreeSet;

use super::{WILDCARD, split_selector};
use crate::errors::{AutograderError, Result};
use crate::models::course_users::entities::{CourseUser, CourseUserRole};
use crate::utils::is_email;

/// 解析后的课程用户引用
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCourseUserReference {
    pub emails: BTreeSet<String>,
    pub exclude_emails: BTreeSet<String>,
    pub roles: BTreeSet<CourseUserRole>,
    pub exclude_roles: BTreeSet<CourseUserRole>,
}

/// 解析课程范围的选择器
///
/// 遇到无法识别的选择器时继续解析其余部分，返回已填充的结构以及合并后的错误。
pub fn parse_course_user_references<S: AsRef<str>>(
    raw_references: &[S],
) -> (ParsedCourseUserReference, Option<AutograderError>) {
    let mut parsed = ParsedCourseUserReference::default();
    let mut errors = Vec::new();

    for raw in raw_references {
        let raw = raw.as_ref();
        let (exclude, selector) = split_selector(raw);
        if selector.is_empty() {
            continue;
        }

        if is_email(&selector) {
            parsed.emails_mut(exclude).insert(selector);
            continue;
        }

        if selector == WILDCARD {
            parsed
                .roles_mut(exclude)
                .extend(CourseUserRole::common_roles().iter().copied());
            continue;
        }

        match selector.parse::<CourseUserRole>() {
            Ok(role) if role != CourseUserRole::Unknown => {
                parsed.roles_mut(exclude).insert(role);
            }
            _ => errors.push(AutograderError::invalid_reference(format!(
                "未知的课程角色 '{selector}' (引用 '{raw}')"
            ))),
        }
    }

    (parsed, AutograderError::join(errors))
}

impl ParsedCourseUserReference {
    /// 解析选择器，任一选择器无效即失败
    pub fn parse<S: AsRef<str>>(raw_references: &[S]) -> Result<Self> {
        match parse_course_user_references(raw_references) {
            (_, Some(err)) => Err(err),
            (parsed, None) => Ok(parsed),
        }
    }

    fn emails_mut(&mut self, exclude: bool) -> &mut BTreeSet<String> {
        if exclude {
            &mut self.exclude_emails
        } else {
            &mut self.emails
        }
    }

    fn roles_mut(&mut self, exclude: bool) -> &mut BTreeSet<CourseUserRole> {
        if exclude {
            &mut self.exclude_roles
        } else {
            &mut self.roles
        }
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
            && self.exclude_emails.is_empty()
            && self.roles.is_empty()
            && self.exclude_roles.is_empty()
    }

    /// 四个集合逐一取并集
    pub fn merge(&mut self, other: ParsedCourseUserReference) {
        self.emails.extend(other.emails);
        self.exclude_emails.extend(other.exclude_emails);
        self.roles.extend(other.roles);
        self.exclude_roles.extend(other.exclude_roles);
    }

    pub fn excludes(&self, email: &str, role: CourseUserRole) -> bool {
        self.exclude_emails.contains(email) || self.exclude_roles.contains(&role)
    }

    pub fn refers_to(&self, email: &str, role: CourseUserRole) -> bool {
        if self.excludes(email, role) {
            return false;
        }
        self.emails.contains(email) || self.roles.contains(&role)
    }

    /// 解析为邮箱列表（升序）
    ///
    /// 不属于课程的包含邮箱同样输出，除非它被显式排除。
    pub fn resolve_course_user_emails(&self, users: &[CourseUser]) -> Vec<String> {
        let mut emails: BTreeSet<String> = users
            .iter()
            .filter(|user| self.refers_to(&user.email, user.role))
            .map(|user| user.email.clone())
            .collect();

        for email in &self.emails {
            let known = users.iter().any(|user| &user.email == email);
            if !known && !self.exclude_emails.contains(email) {
                emails.insert(email.clone());
            }
        }

        emails.into_iter().collect()
    }

    /// 解析为课程用户列表（按邮箱升序）
    pub fn resolve_course_users(&self, users: &[CourseUser]) -> Vec<CourseUser> {
        let mut result: Vec<CourseUser> = users
            .iter()
            .filter(|user| self.refers_to(&user.email, user.role))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.email.cmp(&b.email));
        result
    }
}
