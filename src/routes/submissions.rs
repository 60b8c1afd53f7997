use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use once_cell::sync::Lazy;

use crate::middlewares::{RequireAuth, RequireCourseRole};
use crate::models::course_users::entities::CourseUserRole;
use crate::models::submissions::requests::{
    FetchAttemptQuery, FetchScoresRequest, RemoveSubmissionRequest, TargetUserQuery,
};
use crate::services::SubmissionService;

// 懒加载的全局 SubmissionService 实例
static SUBMISSION_SERVICE: Lazy<SubmissionService> = Lazy::new(SubmissionService::new_lazy);

// 获取单次提交
pub async fn fetch_attempt(
    req: HttpRequest,
    path: web::Path<(String, String)>, // (course_id, assignment_id)
    query: web::Query<FetchAttemptQuery>,
) -> ActixResult<HttpResponse> {
    let (course_id, assignment_id) = path.into_inner();
    SUBMISSION_SERVICE
        .fetch_attempt(&req, &course_id, &assignment_id, query.into_inner())
        .await
}

// 获取全部提交
pub async fn fetch_attempts(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    query: web::Query<TargetUserQuery>,
) -> ActixResult<HttpResponse> {
    let (course_id, assignment_id) = path.into_inner();
    SUBMISSION_SERVICE
        .fetch_attempts(&req, &course_id, &assignment_id, query.into_inner())
        .await
}

// 获取提交历史
pub async fn fetch_history(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    query: web::Query<TargetUserQuery>,
) -> ActixResult<HttpResponse> {
    let (course_id, assignment_id) = path.into_inner();
    SUBMISSION_SERVICE
        .fetch_history(&req, &course_id, &assignment_id, query.into_inner())
        .await
}

// 获取最近成绩
pub async fn fetch_scores(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Json<FetchScoresRequest>,
) -> ActixResult<HttpResponse> {
    let (course_id, assignment_id) = path.into_inner();
    SUBMISSION_SERVICE
        .fetch_scores(&req, &course_id, &assignment_id, body.into_inner())
        .await
}

// 删除提交
pub async fn remove_submission(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Json<RemoveSubmissionRequest>,
) -> ActixResult<HttpResponse> {
    let (course_id, assignment_id) = path.into_inner();
    SUBMISSION_SERVICE
        .remove_submission(&req, &course_id, &assignment_id, body.into_inner())
        .await
}

// 配置路由
pub fn configure_submissions_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/courses/{course_id}/assignments/{assignment_id}/submission")
            .wrap(RequireAuth)
            .service(
                web::resource("/fetch/user/attempt")
                    .wrap(RequireCourseRole::new(CourseUserRole::Student))
                    .route(web::get().to(fetch_attempt)),
            )
            .service(
                web::resource("/fetch/user/attempts")
                    .wrap(RequireCourseRole::new(CourseUserRole::Grader))
                    .route(web::get().to(fetch_attempts)),
            )
            .service(
                web::resource("/fetch/user/history")
                    .wrap(RequireCourseRole::new(CourseUserRole::Student))
                    .route(web::get().to(fetch_history)),
            )
            .service(
                web::resource("/fetch/scores")
                    .wrap(RequireCourseRole::new(CourseUserRole::Grader))
                    .route(web::post().to(fetch_scores)),
            )
            .service(
                web::resource("/remove")
                    .wrap(RequireCourseRole::new(CourseUserRole::Grader))
                    .route(web::post().to(remove_submission)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tokens::entities::TokenSource;
    use crate::storage::Storage;
    use crate::storage::file_storage::{
        FileStorage,
        fixtures::{ASSIGNMENT_ID, COURSE_ID, SHORT_IDS, STUDENT, TestStorage},
    };
    use actix_web::{App, http::StatusCode, test};
    use serde_json::{Value, json};
    use std::sync::Arc;

    const GRADER: &str = "course-grader@test.edulinq.org";
    const OTHER: &str = "course-other@test.edulinq.org";
    const TOKEN: &str = "letmein";

    async fn setup() -> (TestStorage, Arc<dyn Storage>) {
        let test = TestStorage::with_submissions().await;
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(test.dir.path()).unwrap());
        for email in [STUDENT, GRADER, OTHER] {
            storage
                .add_token(email, TOKEN, TokenSource::Password, "test")
                .await
                .unwrap()
                .unwrap();
        }
        (test, storage)
    }

    fn url(op: &str) -> String {
        format!("/api/v1/courses/{COURSE_ID}/assignments/{ASSIGNMENT_ID}/submission/{op}")
    }

    macro_rules! app {
        ($storage:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($storage.clone()))
                    .configure(configure_submissions_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_missing_credentials_rejected() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::get()
            .uri(&url("fetch/user/history"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["locator"], "-012");
    }

    #[actix_web::test]
    async fn test_wrong_token_rejected() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::get()
            .uri(&url("fetch/user/history"))
            .insert_header(("X-Autograder-Email", STUDENT))
            .insert_header(("X-Autograder-Token", "wrong"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_student_cannot_fetch_scores() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::post()
            .uri(&url("fetch/scores"))
            .insert_header(("X-Autograder-Email", STUDENT))
            .insert_header(("X-Autograder-Token", TOKEN))
            .set_json(json!({"target-users": ["*"]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["locator"], "-020");
        assert!(body.get("content").is_none());
    }

    #[actix_web::test]
    async fn test_grader_fetches_scores() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::post()
            .uri(&url("fetch/scores"))
            .insert_header(("X-Autograder-Email", GRADER))
            .insert_header(("X-Autograder-Token", TOKEN))
            .set_json(json!({"target-users": ["student"]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let infos = &body["content"]["submission-infos"];
        assert_eq!(infos.as_object().unwrap().len(), 1);
        assert_eq!(infos[STUDENT]["short-id"], SHORT_IDS[2]);
    }

    #[actix_web::test]
    async fn test_student_history_of_self() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::get()
            .uri(&url("fetch/user/history"))
            .insert_header(("X-Autograder-Email", STUDENT))
            .insert_header(("X-Autograder-Token", TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["content"]["found-user"], true);
        assert_eq!(body["content"]["history"].as_array().unwrap().len(), 3);
    }

    #[actix_web::test]
    async fn test_student_cannot_target_others() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::get()
            .uri(&format!("{}?target-email={GRADER}", url("fetch/user/attempt")))
            .insert_header(("X-Autograder-Email", STUDENT))
            .insert_header(("X-Autograder-Token", TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["locator"], "-033");
    }

    #[actix_web::test]
    async fn test_other_role_below_student_rejected() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::get()
            .uri(&url("fetch/user/attempt"))
            .insert_header(("X-Autograder-Email", OTHER))
            .insert_header(("X-Autograder-Token", TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_grader_fetches_and_removes_attempt() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::get()
            .uri(&format!(
                "{}?target-email={STUDENT}&target-submission={}",
                url("fetch/user/attempt"),
                SHORT_IDS[0]
            ))
            .insert_header(("X-Autograder-Email", GRADER))
            .insert_header(("X-Autograder-Token", TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["content"]["found-submission"], true);
        assert_eq!(
            body["content"]["grading-result"]["info"]["short-id"],
            SHORT_IDS[0]
        );

        let req = test::TestRequest::post()
            .uri(&url("remove"))
            .insert_header(("X-Autograder-Email", GRADER))
            .insert_header(("X-Autograder-Token", TOKEN))
            .set_json(json!({"target-email": STUDENT, "target-submission": SHORT_IDS[0]}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["content"]["found-user"], true);
        assert_eq!(body["content"]["found-submission"], true);

        let req = test::TestRequest::get()
            .uri(&format!("{}?target-email={STUDENT}", url("fetch/user/attempts")))
            .insert_header(("X-Autograder-Email", GRADER))
            .insert_header(("X-Autograder-Token", TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["content"]["grading-results"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn test_unknown_assignment_not_found() {
        let (_test, storage) = setup().await;
        let app = app!(storage);

        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/courses/{COURSE_ID}/assignments/zzz/submission/fetch/user/history"
            ))
            .insert_header(("X-Autograder-Email", STUDENT))
            .insert_header(("X-Autograder-Token", TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["locator"], "-042");
    }
}
