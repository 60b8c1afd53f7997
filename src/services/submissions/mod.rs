pub mod attempts;
pub mod fetch_attempt;
pub mod history;
pub mod remove;
pub mod scores;

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, http::StatusCode, web};
use std::sync::Arc;
use tracing::error;

use crate::errors::{AutograderError, Result};
use crate::middlewares::RequireAuth;
use crate::models::ApiResponse;
use crate::models::common::short_id_from_target;
use crate::models::course_users::entities::CourseUserRole;
use crate::models::courses::entities::Assignment;
use crate::models::submissions::requests::{
    FetchAttemptQuery, FetchScoresRequest, RemoveSubmissionRequest, TargetUserQuery,
};
use crate::models::users::entities::ServerUser;
use crate::storage::Storage;
use crate::utils::{is_email, validate_email, validate_id};

// 提交存储失败时对外暴露的定位码
pub const LOCATOR_FETCH_CONTENTS: &str = "-602";
pub const LOCATOR_FETCH_ATTEMPTS: &str = "-603";
pub const LOCATOR_FETCH_HISTORY: &str = "-604";
pub const LOCATOR_FETCH_SCORES: &str = "-605";
pub const LOCATOR_REMOVE: &str = "-606";
pub const LOCATOR_SAVE: &str = "-607";

pub struct SubmissionService {
    storage: Option<Arc<dyn Storage>>,
}

/// 已通过认证与角色检查的请求上下文
pub(crate) struct RequestContext {
    pub storage: Arc<dyn Storage>,
    pub user: ServerUser,
    pub assignment: Assignment,
}

impl SubmissionService {
    pub fn new_lazy() -> Self {
        Self { storage: None }
    }

    #[cfg(test)]
    pub fn with_storage(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    pub(crate) fn get_storage(&self, request: &HttpRequest) -> Result<Arc<dyn Storage>> {
        if let Some(storage) = &self.storage {
            return Ok(storage.clone());
        }

        request
            .app_data::<web::Data<Arc<dyn Storage>>>()
            .map(|data| data.get_ref().clone())
            .ok_or_else(|| AutograderError::config("Storage not found in app data"))
    }

    /// 取出存储、当前用户以及路径中的作业
    pub(crate) async fn context(
        &self,
        request: &HttpRequest,
        course_id: &str,
        assignment_id: &str,
    ) -> Result<RequestContext> {
        let storage = self.get_storage(request)?;
        let user = RequireAuth::extract_user(request)
            .ok_or_else(|| AutograderError::authentication("无法获取用户信息"))?;

        let course_id = validate_id(course_id)?;
        let assignment_id = validate_id(assignment_id)?;

        let course = storage
            .get_course(&course_id)
            .await?
            .ok_or_else(|| AutograderError::not_found(format!("课程 '{course_id}' 不存在")))?;
        let assignment = course.get_assignment(&assignment_id).cloned().ok_or_else(|| {
            AutograderError::not_found(format!(
                "课程 '{course_id}' 中不存在作业 '{assignment_id}'"
            ))
        })?;

        Ok(RequestContext {
            storage,
            user,
            assignment,
        })
    }

    /// 获取单次提交
    pub async fn fetch_attempt(
        &self,
        request: &HttpRequest,
        course_id: &str,
        assignment_id: &str,
        query: FetchAttemptQuery,
    ) -> ActixResult<HttpResponse> {
        fetch_attempt::fetch_attempt(self, request, course_id, assignment_id, query).await
    }

    /// 获取全部提交
    pub async fn fetch_attempts(
        &self,
        request: &HttpRequest,
        course_id: &str,
        assignment_id: &str,
        query: TargetUserQuery,
    ) -> ActixResult<HttpResponse> {
        attempts::fetch_attempts(self, request, course_id, assignment_id, query).await
    }

    /// 获取提交历史
    pub async fn fetch_history(
        &self,
        request: &HttpRequest,
        course_id: &str,
        assignment_id: &str,
        query: TargetUserQuery,
    ) -> ActixResult<HttpResponse> {
        history::fetch_history(self, request, course_id, assignment_id, query).await
    }

    /// 获取引用用户的最近成绩
    pub async fn fetch_scores(
        &self,
        request: &HttpRequest,
        course_id: &str,
        assignment_id: &str,
        body: FetchScoresRequest,
    ) -> ActixResult<HttpResponse> {
        scores::fetch_scores(self, request, course_id, assignment_id, body).await
    }

    /// 删除提交
    pub async fn remove_submission(
        &self,
        request: &HttpRequest,
        course_id: &str,
        assignment_id: &str,
        body: RemoveSubmissionRequest,
    ) -> ActixResult<HttpResponse> {
        remove::remove_submission(self, request, course_id, assignment_id, body).await
    }
}

/// 解析目标用户：为空时指向调用者；指向他人时要求 grader 及以上
pub(crate) fn resolve_target_user(
    user: &ServerUser,
    course_id: &str,
    target_email: &str,
) -> Result<String> {
    if target_email.trim().is_empty() {
        return Ok(user.email.clone());
    }

    let target = validate_email(target_email)?;
    if !is_email(&target) || target.contains(['/', '\\']) {
        return Err(AutograderError::validation(format!(
            "目标用户 '{target}' 不是合法的邮箱"
        )));
    }
    if target == user.email {
        return Ok(target);
    }

    if user.effective_course_role(course_id) < CourseUserRole::Grader {
        return Err(AutograderError::target_user_authorization(
            "没有权限查看其他用户的提交",
        ));
    }

    Ok(target)
}

/// 目标用户是否为课程成员
pub(crate) async fn is_course_user(
    storage: &Arc<dyn Storage>,
    course_id: &str,
    email: &str,
) -> Result<bool> {
    let users = storage.get_course_users(course_id).await?;
    Ok(users.iter().any(|u| u.email == email))
}

/// 从 `target-submission` 取出并校验短 ID；允许为空（表示最近一次）
pub(crate) fn validate_short_id(target_submission: &str) -> Result<String> {
    let short_id = short_id_from_target(target_submission);
    if short_id.is_empty() {
        return Ok(short_id);
    }
    validate_id(&short_id)
}

fn status_for(err: &AutograderError) -> StatusCode {
    match err {
        AutograderError::Authentication(_) => StatusCode::UNAUTHORIZED,
        AutograderError::Authorization(_) | AutograderError::TargetUserAuthorization(_) => {
            StatusCode::FORBIDDEN
        }
        AutograderError::InvalidReference(_) | AutograderError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        AutograderError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 将错误转换为统一响应
pub(crate) fn error_response(err: &AutograderError) -> HttpResponse {
    HttpResponse::build(status_for(err)).json(ApiResponse::error_empty(err.code(), err.message()))
}

/// 提交存储失败：使用操作对应的定位码
pub(crate) fn store_error_response(locator: &str, err: &AutograderError) -> HttpResponse {
    error!(locator = locator, "提交存储操作失败: {}", err);
    HttpResponse::InternalServerError().json(ApiResponse::error_empty(locator, err.message()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::entities::{ServerUserRole, UserCourseInfo};

    fn member(email: &str, role: CourseUserRole) -> ServerUser {
        let mut user = ServerUser::new(email, ServerUserRole::User);
        user.course_info.insert(
            "course101".to_string(),
            UserCourseInfo {
                role,
                lms_id: None,
            },
        );
        user
    }

    #[test]
    fn test_target_defaults_to_self() {
        let student = member("a@test.edulinq.org", CourseUserRole::Student);
        assert_eq!(
            resolve_target_user(&student, "course101", "").unwrap(),
            "a@test.edulinq.org"
        );
        assert_eq!(
            resolve_target_user(&student, "course101", "A@test.edulinq.org").unwrap(),
            "a@test.edulinq.org"
        );
    }

    #[test]
    fn test_student_cannot_target_others() {
        let student = member("a@test.edulinq.org", CourseUserRole::Student);
        let err = resolve_target_user(&student, "course101", "b@test.edulinq.org").unwrap_err();
        assert_eq!(err.code(), "-033");
    }

    #[test]
    fn test_grader_can_target_others() {
        let grader = member("g@test.edulinq.org", CourseUserRole::Grader);
        assert_eq!(
            resolve_target_user(&grader, "course101", "b@test.edulinq.org").unwrap(),
            "b@test.edulinq.org"
        );
    }

    #[test]
    fn test_short_id_rejects_paths() {
        assert_eq!(validate_short_id(" ").unwrap(), "");
        assert_eq!(validate_short_id("1697406256").unwrap(), "1697406256");
        assert!(validate_short_id("../1697406256").is_err());
        assert_eq!(
            validate_short_id("course101::hw0::a@test.edulinq.org::1697406256").unwrap(),
            "1697406256"
        );
    }

    #[test]
    fn test_target_rejects_paths() {
        let grader = member("g@test.edulinq.org", CourseUserRole::Grader);
        let err = resolve_target_user(&grader, "course101", "../x@test.edulinq.org").unwrap_err();
        assert_eq!(err.code(), "-041");
        assert!(resolve_target_user(&grader, "course101", "nobody").is_err());
    }
}
