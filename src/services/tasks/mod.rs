//! 定时任务运行器
//!
//! 每种任务类型对应一个运行器，调度器通过类型查表分派。

pub mod backup;
pub mod collaborators;
pub mod email_logs;
pub mod report;
pub mod scoring_upload;
pub mod update;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::errors::{AutograderError, Result};
use crate::models::{
    course_users::entities::CourseUser,
    courses::entities::Course,
    references::ParsedCourseUserReference,
    tasks::entities::{FullScheduledTask, TaskType},
};
use crate::storage::Storage;
use crate::utils::timeout::with_deadlines;
use collaborators::{
    CourseBackup, CourseUpdater, EmailSender, LocalCourseUpdater, LogQuerier, NoLmsScoringUploader,
    ReportBuilder, ScoringUploader, StorageLogQuerier, StorageReportBuilder, TarBackup,
    TracingEmailSender,
};

#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &FullScheduledTask) -> Result<()>;
}

pub type RunnerTable = HashMap<TaskType, Arc<dyn TaskRunner>>;

/// 运行器使用的协作方集合
#[derive(Clone)]
pub struct Collaborators {
    pub backup: Arc<dyn CourseBackup>,
    pub updater: Arc<dyn CourseUpdater>,
    pub scoring_uploader: Arc<dyn ScoringUploader>,
    pub report_builder: Arc<dyn ReportBuilder>,
    pub log_querier: Arc<dyn LogQuerier>,
    pub email_sender: Arc<dyn EmailSender>,
}

impl Collaborators {
    /// 只依赖本地文件系统的默认实现
    pub fn local(storage: Arc<dyn Storage>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup: Arc::new(TarBackup::new(base_dir)),
            updater: Arc::new(LocalCourseUpdater::new(storage.clone())),
            scoring_uploader: Arc::new(NoLmsScoringUploader),
            report_builder: Arc::new(StorageReportBuilder::new(storage.clone())),
            log_querier: Arc::new(StorageLogQuerier::new(storage)),
            email_sender: Arc::new(TracingEmailSender),
        }
    }
}

/// 邮件发送的软/硬截止时间
#[derive(Debug, Clone, Copy)]
pub struct EmailDeadlines {
    pub soft: Duration,
    pub hard: Duration,
}

impl EmailDeadlines {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            soft: Duration::from_millis(config.timeouts.email_soft_ms),
            hard: Duration::from_millis(config.timeouts.email_hard_ms),
        }
    }
}

/// 按类型构建运行器表
///
/// `test` 类型只在测试中注册。
pub fn build_runner_table(
    storage: Arc<dyn Storage>,
    collaborators: Collaborators,
    deadlines: EmailDeadlines,
) -> RunnerTable {
    let mut table: RunnerTable = HashMap::new();

    table.insert(
        TaskType::Backup,
        Arc::new(backup::BackupRunner::new(storage.clone(), collaborators.backup)),
    );
    table.insert(
        TaskType::Update,
        Arc::new(update::UpdateRunner::new(storage.clone(), collaborators.updater)),
    );
    table.insert(
        TaskType::ScoringUpload,
        Arc::new(scoring_upload::ScoringUploadRunner::new(
            storage.clone(),
            collaborators.scoring_uploader,
        )),
    );
    table.insert(
        TaskType::Report,
        Arc::new(report::ReportRunner::new(
            storage.clone(),
            collaborators.report_builder,
            collaborators.email_sender.clone(),
            deadlines,
        )),
    );
    table.insert(
        TaskType::EmailLogs,
        Arc::new(email_logs::EmailLogsRunner::new(
            storage,
            collaborators.log_querier,
            collaborators.email_sender,
            deadlines,
        )),
    );

    table
}

/// 加载任务所属的课程；课程不存在时运行失败
pub(crate) async fn load_task_course(
    storage: &Arc<dyn Storage>,
    task: &FullScheduledTask,
) -> Result<Course> {
    let course_id = task.course_id();
    storage.get_course(course_id).await?.ok_or_else(|| {
        AutograderError::not_found(format!(
            "任务 '{}' ({}) 所属的课程 '{}' 不存在",
            task.user_info.name,
            task.task_type(),
            course_id
        ))
    })
}

/// 将任务的 `to` 选项解析为课程成员的邮箱
pub(crate) async fn resolve_recipients(
    storage: &Arc<dyn Storage>,
    course: &Course,
    task: &FullScheduledTask,
) -> Result<Vec<String>> {
    let to = task.user_info.to()?;
    let reference = ParsedCourseUserReference::parse(&to)?;
    let users = storage.get_course_users(&course.id).await?;

    Ok(reference
        .resolve_course_users(&users)
        .into_iter()
        .map(|user: CourseUser| user.email)
        .collect())
}

/// 在截止时间内发送邮件
pub(crate) async fn send_email(
    sender: &Arc<dyn EmailSender>,
    deadlines: EmailDeadlines,
    to: Vec<String>,
    subject: String,
    body: String,
    is_html: bool,
) -> Result<()> {
    let sender = sender.clone();
    with_deadlines(deadlines.soft, deadlines.hard, "邮件发送", move |_cancel| async move {
        sender.send(&to, &subject, &body, is_html).await
    })
    .await
}

/// 任务上下文，附加到运行器返回的错误上
pub(crate) fn task_context(task: &FullScheduledTask) -> String {
    format!(
        "任务 '{}' ({}, 课程 '{}')",
        task.user_info.name,
        task.task_type(),
        task.course_id()
    )
}
