use std::collections::{BTreeMap, BTreeSet};

use super::course::ParsedCourseUserReference;
use super::{WILDCARD, split_selector};
use crate::errors::{AutograderError, Result};
use crate::models::common::ids::ID_DELIM;
use crate::models::course_users::entities::CourseUserRole;
use crate::models::users::entities::{ServerUser, ServerUserRole};
use crate::utils::is_email;

/// 解析后的服务器用户引用
///
/// `course_references` 以课程 ID 为键，保存 `<course>::<role>` 形式的选择器。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedServerUserReference {
    pub emails: BTreeSet<String>,
    pub exclude_emails: BTreeSet<String>,
    pub server_roles: BTreeSet<ServerUserRole>,
    pub exclude_server_roles: BTreeSet<ServerUserRole>,
    pub course_references: BTreeMap<String, ParsedCourseUserReference>,
}

/// 解析服务器范围的选择器
///
/// `known_course_ids` 用于校验课程 ID 以及展开 `*::<role>`。
pub fn parse_server_user_references<S: AsRef<str>>(
    raw_references: &[S],
    known_course_ids: &[String],
) -> (ParsedServerUserReference, Option<AutograderError>) {
    let mut parsed = ParsedServerUserReference::default();
    let mut errors = Vec::new();

    for raw in raw_references {
        let raw = raw.as_ref();
        let (exclude, selector) = split_selector(raw);
        if selector.is_empty() {
            continue;
        }

        if is_email(&selector) {
            if exclude {
                parsed.exclude_emails.insert(selector);
            } else {
                parsed.emails.insert(selector);
            }
            continue;
        }

        if selector == WILDCARD {
            parsed
                .server_roles_mut(exclude)
                .extend(ServerUserRole::common_roles().iter().copied());
            continue;
        }

        let parts: Vec<&str> = selector.split(ID_DELIM).map(str::trim).collect();
        match parts.as_slice() {
            [role] => match role.parse::<ServerUserRole>() {
                Ok(role) if role != ServerUserRole::Unknown => {
                    parsed.server_roles_mut(exclude).insert(role);
                }
                _ => errors.push(AutograderError::invalid_reference(format!(
                    "未知的服务器角色 '{role}' (引用 '{raw}')"
                ))),
            },
            [course, role] => {
                if let Err(err) = parsed.add_course_selector(course, role, exclude, known_course_ids)
                {
                    errors.push(err.context(format!("引用 '{raw}'")));
                }
            }
            _ => errors.push(AutograderError::invalid_reference(format!(
                "引用 '{raw}' 最多只能包含一个 '{ID_DELIM}'"
            ))),
        }
    }

    (parsed, AutograderError::join(errors))
}

impl ParsedServerUserReference {
    /// 解析选择器，任一选择器无效即失败
    pub fn parse<S: AsRef<str>>(raw_references: &[S], known_course_ids: &[String]) -> Result<Self> {
        match parse_server_user_references(raw_references, known_course_ids) {
            (_, Some(err)) => Err(err),
            (parsed, None) => Ok(parsed),
        }
    }

    fn server_roles_mut(&mut self, exclude: bool) -> &mut BTreeSet<ServerUserRole> {
        if exclude {
            &mut self.exclude_server_roles
        } else {
            &mut self.server_roles
        }
    }

    fn add_course_selector(
        &mut self,
        course: &str,
        role: &str,
        exclude: bool,
        known_course_ids: &[String],
    ) -> Result<()> {
        let roles: Vec<CourseUserRole> = if role == WILDCARD {
            CourseUserRole::common_roles().to_vec()
        } else {
            match role.parse::<CourseUserRole>() {
                Ok(role) if role != CourseUserRole::Unknown => vec![role],
                _ => {
                    return Err(AutograderError::invalid_reference(format!(
                        "未知的课程角色 '{role}'"
                    )));
                }
            }
        };

        let course_ids: Vec<String> = if course == WILDCARD {
            known_course_ids.to_vec()
        } else if known_course_ids.iter().any(|id| id == course) {
            vec![course.to_string()]
        } else {
            return Err(AutograderError::invalid_reference(format!(
                "未知的课程 '{course}'"
            )));
        };

        for course_id in course_ids {
            let mut reference = ParsedCourseUserReference::default();
            if exclude {
                reference.exclude_roles.extend(roles.iter().copied());
            } else {
                reference.roles.extend(roles.iter().copied());
            }

            self.course_references
                .entry(course_id)
                .or_default()
                .merge(reference);
        }

        Ok(())
    }

    pub fn excludes(&self, user: &ServerUser) -> bool {
        if self.exclude_emails.contains(&user.email) || self.exclude_server_roles.contains(&user.role)
        {
            return true;
        }

        self.course_references.iter().any(|(course_id, reference)| {
            user.course_info
                .get(course_id)
                .is_some_and(|info| reference.excludes(&user.email, info.role))
        })
    }

    pub fn refers_to(&self, user: &ServerUser) -> bool {
        if self.excludes(user) {
            return false;
        }

        if self.emails.contains(&user.email) || self.server_roles.contains(&user.role) {
            return true;
        }

        self.course_references.iter().any(|(course_id, reference)| {
            user.course_info
                .get(course_id)
                .is_some_and(|info| reference.refers_to(&user.email, info.role))
        })
    }

    /// 解析为邮箱列表（升序），未知的包含邮箱也会输出
    pub fn resolve_server_user_emails(&self, users: &[ServerUser]) -> Vec<String> {
        let mut emails: BTreeSet<String> = users
            .iter()
            .filter(|user| self.refers_to(user))
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

    /// 解析为服务器用户列表（按邮箱升序）
    pub fn resolve_server_users(&self, users: &[ServerUser]) -> Vec<ServerUser> {
        let mut result: Vec<ServerUser> = users
            .iter()
            .filter(|user| self.refers_to(user))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.email.cmp(&b.email));
        result
    }
}
