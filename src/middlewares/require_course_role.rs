/*!
 * 基于课程角色的访问控制中间件
 *
 * 必须在 RequireAuth 之后使用。用户在路径中 `{course_id}` 课程里的有效角色
 * 低于要求时返回 403（定位码 `-020`），响应不带 content。
 *
 * ```rust,ignore
 * web::resource("/submission/fetch/scores")
 *     .wrap(RequireCourseRole::new(CourseUserRole::Grader))
 *     .route(web::post().to(fetch_scores))
 * ```
 */

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpMessage,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use tracing::debug;

use super::create_error_response;
use crate::errors::AutograderError;
use crate::models::course_users::entities::CourseUserRole;
use crate::models::users::entities::ServerUser;

#[derive(Clone)]
pub struct RequireCourseRole {
    min_role: CourseUserRole,
}

impl RequireCourseRole {
    /// 创建要求最低课程角色的中间件
    pub fn new(min_role: CourseUserRole) -> Self {
        Self { min_role }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireCourseRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireCourseRoleMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireCourseRoleMiddleware {
            service: Rc::new(service),
            min_role: self.min_role,
        }))
    }
}

pub struct RequireCourseRoleMiddleware<S> {
    service: Rc<S>,
    min_role: CourseUserRole,
}

impl<S, B> Service<ServiceRequest> for RequireCourseRoleMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        let min_role = self.min_role;

        Box::pin(async move {
            // 1. 校验用户信息
            let Some(user) = req.extensions().get::<ServerUser>().cloned() else {
                let err = AutograderError::authentication("Unauthorized: missing user");
                return Ok(req.into_response(
                    create_error_response(StatusCode::UNAUTHORIZED, &err).map_into_right_body(),
                ));
            };

            // 2. 校验 course_id
            let Some(course_id) = req
                .match_info()
                .get("course_id")
                .map(|id| id.trim().to_lowercase())
            else {
                let err = AutograderError::validation("Missing course_id");
                return Ok(req.into_response(
                    create_error_response(StatusCode::BAD_REQUEST, &err).map_into_right_body(),
                ));
            };

            // 3. 比较有效角色与最低角色
            let role = user.effective_course_role(&course_id);
            if role < min_role {
                debug!(
                    "User {} has course role '{}' in '{}', '{}' required",
                    user.email, role, course_id, min_role
                );
                let err = AutograderError::authorization("权限不足");
                return Ok(req.into_response(
                    create_error_response(StatusCode::FORBIDDEN, &err).map_into_right_body(),
                ));
            }

            Ok(srv.call(req).await?.map_into_left_body())
        })
    }
}
