use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::AppConfig;
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

use crate::errors::Result;

pub mod file_storage;

#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// 课程管理方法
    // 获取课程
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>>;
    // 列出所有课程
    async fn get_courses(&self) -> Result<Vec<Course>>;
    // 保存课程配置
    async fn save_course(&self, course: &Course) -> Result<()>;
    // 列出课程成员
    async fn get_course_users(&self, course_id: &str) -> Result<Vec<CourseUser>>;

    /// 用户管理方法
    // 列出所有服务器用户
    async fn get_server_users(&self) -> Result<BTreeMap<String, ServerUser>>;
    // 通过邮箱获取用户
    async fn get_server_user(&self, email: &str) -> Result<Option<ServerUser>>;
    // 插入或合并用户
    async fn upsert_users(&self, users: Vec<ServerUser>) -> Result<()>;
    // 删除用户
    async fn delete_user(&self, email: &str) -> Result<bool>;
    // 为用户创建令牌，用户不存在时返回 None
    async fn add_token(
        &self,
        email: &str,
        cleartext: &str,
        source: TokenSource,
        name: &str,
    ) -> Result<Option<Token>>;
    // 吊销令牌
    async fn remove_token(&self, email: &str, token_id: &str) -> Result<bool>;
    // 使用明文令牌认证用户，成功时记录访问时间
    async fn authenticate_user(&self, email: &str, cleartext: &str) -> Result<Option<ServerUser>>;

    /// 提交管理方法
    // 分配下一个短 ID
    async fn get_next_submission_id(&self, assignment: &Assignment, email: &str) -> Result<String>;
    // 批量保存评分结果（尽力而为）
    async fn save_submissions(&self, course_id: &str, results: Vec<GradingResult>) -> Result<()>;
    // 获取单次提交，短 ID 为空时取最近一次
    async fn get_submission_contents(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<Option<GradingResult>>;
    // 获取全部提交（按评分开始时间升序）
    async fn get_submission_attempts(
        &self,
        assignment: &Assignment,
        email: &str,
    ) -> Result<Vec<GradingResult>>;
    // 获取提交历史（按评分开始时间升序）
    async fn get_submission_history(
        &self,
        assignment: &Assignment,
        email: &str,
    ) -> Result<Vec<SubmissionHistoryItem>>;
    // 获取引用所指用户的最近一次提交
    async fn get_recent_submissions(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<GradingResult>>>;
    async fn get_recent_submission_survey(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<SubmissionHistoryItem>>>;
    async fn get_scoring_infos(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<ScoringInfo>>>;
    // 获取前一次提交的完整 ID，没有时返回空串
    async fn get_previous_submission_id(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<String>;
    // 删除提交，返回提交是否存在
    async fn remove_submission(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<bool>;

    /// 代码分析方法
    async fn store_individual_analysis(&self, records: Vec<IndividualAnalysis>) -> Result<()>;
    async fn get_individual_analysis(
        &self,
        full_ids: &[String],
    ) -> Result<BTreeMap<String, IndividualAnalysis>>;
    async fn remove_individual_analysis(&self, full_ids: &[String]) -> Result<()>;
    async fn store_pairwise_analysis(&self, records: Vec<PairwiseAnalysis>) -> Result<()>;
    async fn get_pairwise_analysis(
        &self,
        keys: &[PairwiseKey],
    ) -> Result<BTreeMap<PairwiseKey, PairwiseAnalysis>>;
    async fn remove_pairwise_analysis(&self, keys: &[PairwiseKey]) -> Result<()>;

    /// 定时任务方法
    // 根据课程配置刷新该课程的任务
    async fn upsert_course_tasks(&self, course: &Course) -> Result<()>;
    async fn get_tasks(&self) -> Result<Vec<FullScheduledTask>>;
    // 下次运行时间最早的启用任务
    async fn get_next_active_task(&self) -> Result<Option<FullScheduledTask>>;
    async fn save_task(&self, task: &FullScheduledTask) -> Result<()>;
    // 删除不属于给定课程的任务，返回删除数量
    async fn prune_tasks(&self, course_ids: &[String]) -> Result<usize>;

    /// 日志方法
    async fn append_logs(&self, records: Vec<LogRecord>) -> Result<()>;
    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>>;
}

pub async fn create_storage() -> Result<Arc<dyn Storage>> {
    let config = AppConfig::get();
    let storage = file_storage::FileStorage::new(&config.storage.base_dir)?;
    Ok(Arc::new(storage))
}
