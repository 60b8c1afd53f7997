//! 文件系统存储实现
//!
//! 目录布局：
//!
//! ```text
//! <base>/users.json
//! <base>/tasks.json
//! <base>/log.jsonl
//! <base>/courses/<course>/course.json
//! <base>/courses/<course>/submissions/<assignment>/<email>/<short-id>/...
//! <base>/courses/<course>/analysis-individual.jsonl
//! <base>/courses/<course>/analysis-pairwise.jsonl
//! ```

mod analysis;
mod courses;
pub mod lock_manager;
mod logs;
mod submissions;
mod tasks;
mod users;

#[cfg(test)]
pub(crate) mod fixtures;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::errors::{AutograderError, Result};
use lock_manager::LockManager;

pub const USERS_FILENAME: &str = "users.json";
pub const TASKS_FILENAME: &str = "tasks.json";
pub const LOG_FILENAME: &str = "log.jsonl";
pub const COURSES_DIRNAME: &str = "courses";
pub const COURSE_FILENAME: &str = "course.json";
pub const SUBMISSIONS_DIRNAME: &str = "submissions";
pub const SUBMISSION_RESULT_FILENAME: &str = "submission-result.json";
pub const INPUT_DIRNAME: &str = "input";
pub const OUTPUT_DIRNAME: &str = "output";
pub const STDOUT_FILENAME: &str = "stdout";
pub const STDERR_FILENAME: &str = "stderr";
pub const INDIVIDUAL_ANALYSIS_FILENAME: &str = "analysis-individual.jsonl";
pub const PAIRWISE_ANALYSIS_FILENAME: &str = "analysis-pairwise.jsonl";

/// 文件系统存储
///
/// 每个逻辑区域持有一把锁；提交与分析日志的写操作另外按路径加锁。
pub struct FileStorage {
    base_dir: PathBuf,
    path_locks: LockManager,
    courses_lock: RwLock<()>,
    users_lock: Mutex<()>,
    tasks_lock: Mutex<()>,
    logs_lock: RwLock<()>,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join(COURSES_DIRNAME)).map_err(|e| {
            AutograderError::storage(format!(
                "创建存储目录 '{}' 失败: {e}",
                base_dir.display()
            ))
        })?;

        info!("文件存储初始化完成，根目录: {}", base_dir.display());

        Ok(Self {
            base_dir,
            path_locks: LockManager::new(),
            courses_lock: RwLock::new(()),
            users_lock: Mutex::new(()),
            tasks_lock: Mutex::new(()),
            logs_lock: RwLock::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub(crate) fn users_path(&self) -> PathBuf {
        self.base_dir.join(USERS_FILENAME)
    }

    pub(crate) fn tasks_path(&self) -> PathBuf {
        self.base_dir.join(TASKS_FILENAME)
    }

    pub(crate) fn log_path(&self) -> PathBuf {
        self.base_dir.join(LOG_FILENAME)
    }

    pub(crate) fn courses_dir(&self) -> PathBuf {
        self.base_dir.join(COURSES_DIRNAME)
    }

    pub fn course_dir(&self, course_id: &str) -> PathBuf {
        self.courses_dir().join(course_id)
    }

    pub(crate) fn course_submissions_dir(&self, course_id: &str) -> PathBuf {
        self.course_dir(course_id).join(SUBMISSIONS_DIRNAME)
    }

    pub(crate) fn user_submissions_dir(
        &self,
        course_id: &str,
        assignment_id: &str,
        email: &str,
    ) -> PathBuf {
        self.course_submissions_dir(course_id)
            .join(assignment_id)
            .join(email)
    }
}

// Storage trait 实现
use crate::models::{
    analysis::entities::{IndividualAnalysis, PairwiseAnalysis, PairwiseKey},
    course_users::entities::CourseUser,
    courses::entities::{Assignment, Course},
    logs::entities::{LogQuery, LogRecord},
    references::ParsedCourseUserReference,
    submissions::entities::{GradingResult, ScoringInfo, SubmissionHistoryItem},
    tasks::entities::FullScheduledTask,
    tokens::entities::{Token, TokenSource},
    users::entities::ServerUser,
};
use crate::storage::Storage;
use async_trait::async_trait;

#[async_trait]
impl Storage for FileStorage {
    // 课程模块
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        self.get_course_impl(course_id).await
    }

    async fn get_courses(&self) -> Result<Vec<Course>> {
        self.get_courses_impl().await
    }

    async fn save_course(&self, course: &Course) -> Result<()> {
        self.save_course_impl(course).await
    }

    async fn get_course_users(&self, course_id: &str) -> Result<Vec<CourseUser>> {
        self.get_course_users_impl(course_id).await
    }

    // 用户模块
    async fn get_server_users(&self) -> Result<BTreeMap<String, ServerUser>> {
        self.get_server_users_impl().await
    }

    async fn get_server_user(&self, email: &str) -> Result<Option<ServerUser>> {
        self.get_server_user_impl(email).await
    }

    async fn upsert_users(&self, users: Vec<ServerUser>) -> Result<()> {
        self.upsert_users_impl(users).await
    }

    async fn delete_user(&self, email: &str) -> Result<bool> {
        self.delete_user_impl(email).await
    }

    async fn add_token(
        &self,
        email: &str,
        cleartext: &str,
        source: TokenSource,
        name: &str,
    ) -> Result<Option<Token>> {
        self.add_token_impl(email, cleartext, source, name).await
    }

    async fn remove_token(&self, email: &str, token_id: &str) -> Result<bool> {
        self.remove_token_impl(email, token_id).await
    }

    async fn authenticate_user(&self, email: &str, cleartext: &str) -> Result<Option<ServerUser>> {
        self.authenticate_user_impl(email, cleartext).await
    }

    // 提交模块
    async fn get_next_submission_id(&self, assignment: &Assignment, email: &str) -> Result<String> {
        self.get_next_submission_id_impl(assignment, email).await
    }

    async fn save_submissions(&self, course_id: &str, results: Vec<GradingResult>) -> Result<()> {
        self.save_submissions_impl(course_id, results).await
    }

    async fn get_submission_contents(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<Option<GradingResult>> {
        self.get_submission_contents_impl(assignment, email, short_id)
            .await
    }

    async fn get_submission_attempts(
        &self,
        assignment: &Assignment,
        email: &str,
    ) -> Result<Vec<GradingResult>> {
        self.get_submission_attempts_impl(assignment, email).await
    }

    async fn get_submission_history(
        &self,
        assignment: &Assignment,
        email: &str,
    ) -> Result<Vec<SubmissionHistoryItem>> {
        self.get_submission_history_impl(assignment, email).await
    }

    async fn get_recent_submissions(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<GradingResult>>> {
        self.get_recent_submissions_impl(assignment, reference).await
    }

    async fn get_recent_submission_survey(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<SubmissionHistoryItem>>> {
        self.get_recent_submission_survey_impl(assignment, reference)
            .await
    }

    async fn get_scoring_infos(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<ScoringInfo>>> {
        self.get_scoring_infos_impl(assignment, reference).await
    }

    async fn get_previous_submission_id(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<String> {
        self.get_previous_submission_id_impl(assignment, email, short_id)
            .await
    }

    async fn remove_submission(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<bool> {
        self.remove_submission_impl(assignment, email, short_id)
            .await
    }

    // 分析模块
    async fn store_individual_analysis(&self, records: Vec<IndividualAnalysis>) -> Result<()> {
        self.store_individual_analysis_impl(records).await
    }

    async fn get_individual_analysis(
        &self,
        full_ids: &[String],
    ) -> Result<BTreeMap<String, IndividualAnalysis>> {
        self.get_individual_analysis_impl(full_ids).await
    }

    async fn remove_individual_analysis(&self, full_ids: &[String]) -> Result<()> {
        self.remove_individual_analysis_impl(full_ids).await
    }

    async fn store_pairwise_analysis(&self, records: Vec<PairwiseAnalysis>) -> Result<()> {
        self.store_pairwise_analysis_impl(records).await
    }

    async fn get_pairwise_analysis(
        &self,
        keys: &[PairwiseKey],
    ) -> Result<BTreeMap<PairwiseKey, PairwiseAnalysis>> {
        self.get_pairwise_analysis_impl(keys).await
    }

    async fn remove_pairwise_analysis(&self, keys: &[PairwiseKey]) -> Result<()> {
        self.remove_pairwise_analysis_impl(keys).await
    }

    // 任务模块
    async fn upsert_course_tasks(&self, course: &Course) -> Result<()> {
        self.upsert_course_tasks_impl(course).await
    }

    async fn get_tasks(&self) -> Result<Vec<FullScheduledTask>> {
        self.get_tasks_impl().await
    }

    async fn get_next_active_task(&self) -> Result<Option<FullScheduledTask>> {
        self.get_next_active_task_impl().await
    }

    async fn save_task(&self, task: &FullScheduledTask) -> Result<()> {
        self.save_task_impl(task).await
    }

    async fn prune_tasks(&self, course_ids: &[String]) -> Result<usize> {
        self.prune_tasks_impl(course_ids).await
    }

    // 日志模块
    async fn append_logs(&self, records: Vec<LogRecord>) -> Result<()> {
        self.append_logs_impl(records).await
    }

    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        self.query_logs_impl(query).await
    }
}
