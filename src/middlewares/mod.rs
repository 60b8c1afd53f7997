pub mod require_auth;
pub mod require_course_role;

pub use require_auth::RequireAuth;
pub use require_course_role::RequireCourseRole;

use actix_web::{HttpResponse, http::StatusCode, http::header::CONTENT_TYPE};

use crate::errors::AutograderError;
use crate::models::ApiResponse;

// 辅助函数：创建错误响应（不带 content）
pub(crate) fn create_error_response(status: StatusCode, err: &AutograderError) -> HttpResponse {
    HttpResponse::build(status)
        .insert_header((CONTENT_TYPE, "application/json; charset=utf-8"))
        .json(ApiResponse::error_empty(err.code(), err.message()))
}
