use actix_web::{
    HttpRequest, HttpResponse,
    error::{InternalError, JsonPayloadError, QueryPayloadError},
};

use crate::errors::AutograderError;
use crate::models::ApiResponse;

fn bad_request(detail: String) -> HttpResponse {
    let err = AutograderError::validation(detail);
    HttpResponse::BadRequest().json(ApiResponse::error_empty(err.code(), err.message()))
}

/// JSON 请求体解析失败时返回统一的 `-041` 响应
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = bad_request(format!("请求体解析失败: {err}"));
    InternalError::from_response(err, response).into()
}

/// 查询参数解析失败时返回统一的 `-041` 响应
pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = bad_request(format!("查询参数解析失败: {err}"));
    InternalError::from_response(err, response).into()
}
