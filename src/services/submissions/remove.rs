use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use tracing::info;

use super::{
    LOCATOR_REMOVE, SubmissionService, error_response, is_course_user, resolve_target_user,
    store_error_response, validate_short_id,
};
use crate::models::ApiResponse;
use crate::models::submissions::{
    requests::RemoveSubmissionRequest, responses::RemoveSubmissionResponse,
};

pub async fn remove_submission(
    service: &SubmissionService,
    request: &HttpRequest,
    course_id: &str,
    assignment_id: &str,
    body: RemoveSubmissionRequest,
) -> ActixResult<HttpResponse> {
    let ctx = match service.context(request, course_id, assignment_id).await {
        Ok(ctx) => ctx,
        Err(e) => return Ok(error_response(&e)),
    };
    let course_id = ctx.assignment.course_id.as_str();

    let target = match resolve_target_user(&ctx.user, course_id, &body.target_email) {
        Ok(target) => target,
        Err(e) => return Ok(error_response(&e)),
    };
    let short_id = match validate_short_id(&body.target_submission) {
        Ok(short_id) => short_id,
        Err(e) => return Ok(error_response(&e)),
    };

    match is_course_user(&ctx.storage, course_id, &target).await {
        Ok(true) => {}
        Ok(false) => {
            return Ok(HttpResponse::Ok().json(ApiResponse::success(
                RemoveSubmissionResponse {
                    found_user: false,
                    found_submission: false,
                },
                "目标用户不在课程中",
            )));
        }
        Err(e) => return Ok(store_error_response(LOCATOR_REMOVE, &e)),
    }

    match ctx
        .storage
        .remove_submission(&ctx.assignment, &target, &short_id)
        .await
    {
        Ok(found_submission) => {
            if found_submission {
                info!(
                    course_id = course_id,
                    assignment_id = %ctx.assignment.id,
                    "{} 删除了 {} 的提交 '{}'",
                    ctx.user.email,
                    target,
                    short_id
                );
            }
            Ok(HttpResponse::Ok().json(ApiResponse::success(
                RemoveSubmissionResponse {
                    found_user: true,
                    found_submission,
                },
                "删除提交完成",
            )))
        }
        Err(e) => Ok(store_error_response(LOCATOR_REMOVE, &e)),
    }
}
