use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};

use super::{
    LOCATOR_FETCH_CONTENTS, SubmissionService, error_response, is_course_user,
    resolve_target_user, store_error_response, validate_short_id,
};
use crate::models::ApiResponse;
use crate::models::submissions::{
    requests::FetchAttemptQuery, responses::FetchAttemptResponse,
};

pub async fn fetch_attempt(
    service: &SubmissionService,
    request: &HttpRequest,
    course_id: &str,
    assignment_id: &str,
    query: FetchAttemptQuery,
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
    let short_id = match validate_short_id(&query.target_submission) {
        Ok(short_id) => short_id,
        Err(e) => return Ok(error_response(&e)),
    };

    match is_course_user(&ctx.storage, course_id, &target).await {
        Ok(true) => {}
        Ok(false) => {
            return Ok(HttpResponse::Ok().json(ApiResponse::success(
                FetchAttemptResponse {
                    found_user: false,
                    found_submission: false,
                    grading_result: None,
                },
                "目标用户不在课程中",
            )));
        }
        Err(e) => return Ok(store_error_response(LOCATOR_FETCH_CONTENTS, &e)),
    }

    match ctx
        .storage
        .get_submission_contents(&ctx.assignment, &target, &short_id)
        .await
    {
        Ok(grading_result) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            FetchAttemptResponse {
                found_user: true,
                found_submission: grading_result.is_some(),
                grading_result,
            },
            "获取提交成功",
        ))),
        Err(e) => Ok(store_error_response(LOCATOR_FETCH_CONTENTS, &e)),
    }
}
