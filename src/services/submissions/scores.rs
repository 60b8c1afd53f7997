use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};

use super::{LOCATOR_FETCH_SCORES, SubmissionService, error_response, store_error_response};
use crate::models::ApiResponse;
use crate::models::references::ParsedCourseUserReference;
use crate::models::submissions::{requests::FetchScoresRequest, responses::FetchScoresResponse};

pub async fn fetch_scores(
    service: &SubmissionService,
    request: &HttpRequest,
    course_id: &str,
    assignment_id: &str,
    body: FetchScoresRequest,
) -> ActixResult<HttpResponse> {
    let ctx = match service.context(request, course_id, assignment_id).await {
        Ok(ctx) => ctx,
        Err(e) => return Ok(error_response(&e)),
    };

    let reference = match ParsedCourseUserReference::parse(&body.target_users) {
        Ok(reference) => reference,
        Err(e) => return Ok(error_response(&e)),
    };

    match ctx
        .storage
        .get_recent_submission_survey(&ctx.assignment, &reference)
        .await
    {
        Ok(submission_infos) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            FetchScoresResponse { submission_infos },
            "获取成绩成功",
        ))),
        Err(e) => Ok(store_error_response(LOCATOR_FETCH_SCORES, &e)),
    }
}
