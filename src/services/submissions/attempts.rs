use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};

use super::{
    LOCATOR_FETCH_ATTEMPTS, SubmissionService, error_response, is_course_user,
    resolve_target_user, store_error_response,
};
use crate::models::ApiResponse;
use crate::models::submissions::{requests::TargetUserQuery, responses::FetchAttemptsResponse};

pub async fn fetch_attempts(
    service: &SubmissionService,
    request: &HttpRequest,
    course_id: &str,
    assignment_id: &str,
    query: TargetUserQuery,
) -> ActixResult<HttpResponse> {
    let ctx = match service.context(request, course_id, assignment_id).await {
        Ok(ctx) => ctx,
        Err(e) => return Ok(error_response(&e)),
    };
    let course_id = ctx.assignment.course_id.as_str();

    let target = match resolve_target_user(&ctx.user, course_id, &query.target_email) {
        Ok(target) => target,
        Err(e) => return Ok(error_response(&e)),
    };

    let found_user = match is_course_user(&ctx.storage, course_id, &target).await {
        Ok(found) => found,
        Err(e) => return Ok(store_error_response(LOCATOR_FETCH_ATTEMPTS, &e)),
    };
    if !found_user {
        return Ok(HttpResponse::Ok().json(ApiResponse::success(
            FetchAttemptsResponse {
                found_user,
                grading_results: Vec::new(),
            },
            "目标用户不在课程中",
        )));
    }

    match ctx
        .storage
        .get_submission_attempts(&ctx.assignment, &target)
        .await
    {
        Ok(grading_results) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            FetchAttemptsResponse {
                found_user,
                grading_results,
            },
            "获取全部提交成功",
        ))),
        Err(e) => Ok(store_error_response(LOCATOR_FETCH_ATTEMPTS, &e)),
    }
}
