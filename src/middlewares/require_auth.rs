/*!
 * 令牌认证中间件
 *
 * 客户端在请求头中携带 `X-Autograder-Email` 与 `X-Autograder-Token`，
 * 中间件用存储中的令牌摘要校验明文令牌。成功时将 `ServerUser` 写入请求扩展，
 * 失败时返回 401（定位码 `-012`）。
 *
 * ```rust,ignore
 * web::scope("/api/v1/courses/{course_id}")
 *     .wrap(RequireAuth)
 *     .route("/...", web::get().to(handler))
 * ```
 */

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpMessage,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
    web,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::{rc::Rc, sync::Arc};
use tracing::debug;

use super::create_error_response;
use crate::errors::{AutograderError, Result};
use crate::models::users::entities::ServerUser;
use crate::storage::Storage;

pub const EMAIL_HEADER: &str = "X-Autograder-Email";
pub const TOKEN_HEADER: &str = "X-Autograder-Token";

#[derive(Clone)]
pub struct RequireAuth;

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAuthMiddleware<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequireAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        Box::pin(async move {
            match authenticate(&req).await {
                Ok(user) => {
                    debug!("Token authentication successful for {}", user.email);
                    req.extensions_mut().insert(user);
                    Ok(srv.call(req).await?.map_into_left_body())
                }
                Err(e) => {
                    debug!("Token authentication failed: {}", e);
                    Ok(req.into_response(
                        create_error_response(StatusCode::UNAUTHORIZED, &e).map_into_right_body(),
                    ))
                }
            }
        })
    }
}

impl RequireAuth {
    /// 从请求扩展中提取已认证的用户
    /// 此函数应该在应用了 RequireAuth 中间件的路由处理程序中使用
    pub fn extract_user(req: &actix_web::HttpRequest) -> Option<ServerUser> {
        req.extensions().get::<ServerUser>().cloned()
    }
}

fn header_value<'a>(req: &'a ServiceRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// 辅助函数：按请求头校验令牌
async fn authenticate(req: &ServiceRequest) -> Result<ServerUser> {
    let (Some(email), Some(token)) = (header_value(req, EMAIL_HEADER), header_value(req, TOKEN_HEADER))
    else {
        return Err(AutograderError::authentication("缺少认证请求头"));
    };

    let storage = req
        .app_data::<web::Data<Arc<dyn Storage>>>()
        .map(|data| data.get_ref().clone())
        .ok_or_else(|| AutograderError::config("Storage not found in app data"))?;

    storage
        .authenticate_user(email, token)
        .await?
        .ok_or_else(|| AutograderError::authentication("邮箱或令牌无效"))
}
