//! 测试用的存储夹具：course101/hw0 以及五个默认课程成员

use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use tempfile::TempDir;

use super::FileStorage;
use crate::models::{
    course_users::entities::CourseUserRole,
    courses::entities::{Assignment, Course},
    submissions::entities::{GradingInfo, GradingResult},
    users::entities::{ServerUser, ServerUserRole, UserCourseInfo},
};
use crate::utils::archive::pack_dir;

pub const COURSE_ID: &str = "course101";
pub const ASSIGNMENT_ID: &str = "hw0";
pub const STUDENT: &str = "course-student@test.edulinq.org";
pub const SHORT_IDS: [&str; 3] = ["1697406256", "1697406265", "1697406272"];

pub fn course_user_emails() -> Vec<(String, CourseUserRole)> {
    [
        CourseUserRole::Other,
        CourseUserRole::Student,
        CourseUserRole::Grader,
        CourseUserRole::Admin,
        CourseUserRole::Owner,
    ]
    .into_iter()
    .map(|role| (format!("course-{}@test.edulinq.org", role.as_str()), role))
    .collect()
}

pub fn course() -> Course {
    let mut assignments = BTreeMap::new();
    assignments.insert(
        ASSIGNMENT_ID.to_string(),
        Assignment {
            id: ASSIGNMENT_ID.to_string(),
            course_id: COURSE_ID.to_string(),
            name: Some("Homework 0".to_string()),
            max_points: 2.0,
        },
    );

    Course {
        id: COURSE_ID.to_string(),
        name: Some("Course 101".to_string()),
        assignments,
        tasks: Vec::new(),
    }
}

pub fn assignment() -> Assignment {
    course().assignments[ASSIGNMENT_ID].clone()
}

pub fn server_users() -> Vec<ServerUser> {
    let mut users: Vec<ServerUser> = course_user_emails()
        .into_iter()
        .map(|(email, role)| {
            let mut user = ServerUser::new(&email, ServerUserRole::User);
            user.course_info.insert(
                COURSE_ID.to_string(),
                UserCourseInfo { role, lms_id: None },
            );
            user
        })
        .collect();

    users.push(ServerUser::new(
        "server-admin@test.edulinq.org",
        ServerUserRole::Admin,
    ));
    users
}

/// 构造一次评分结果，输入包含一个 `submission.py`
pub fn grading_result(email: &str, short_id: &str, score: f64) -> GradingResult {
    let seconds: i64 = short_id.parse().unwrap_or_default();

    let input_dir = TempDir::new().unwrap();
    std::fs::write(input_dir.path().join("submission.py"), format!("# {short_id}\n")).unwrap();

    GradingResult {
        info: GradingInfo {
            id: format!("{COURSE_ID}::{ASSIGNMENT_ID}::{email}::{short_id}"),
            short_id: short_id.to_string(),
            course_id: COURSE_ID.to_string(),
            assignment_id: ASSIGNMENT_ID.to_string(),
            user: email.to_string(),
            message: String::new(),
            max_points: 2.0,
            score,
            grading_start_time: Utc.timestamp_opt(seconds, 0).unwrap(),
            proxy_user: None,
            proxy_start_time: None,
        },
        input_files_gzip: pack_dir(input_dir.path()).unwrap(),
        output_files_gzip: Vec::new(),
        stdout: format!("graded {short_id}\n"),
        stderr: String::new(),
    }
}

pub struct TestStorage {
    pub dir: TempDir,
    pub storage: FileStorage,
}

impl TestStorage {
    /// 只包含课程与用户
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        storage.save_course_impl(&course()).await.unwrap();
        storage.upsert_users_impl(server_users()).await.unwrap();

        Self { dir, storage }
    }

    /// 另外为 course-student 写入三次提交，得分依次为 0、1、2
    pub async fn with_submissions() -> Self {
        let test = Self::new().await;

        let results = SHORT_IDS
            .iter()
            .enumerate()
            .map(|(score, short_id)| grading_result(STUDENT, short_id, score as f64))
            .collect();
        test.storage
            .save_submissions_impl(COURSE_ID, results)
            .await
            .unwrap();

        test
    }
}
