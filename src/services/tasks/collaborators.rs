//! 任务运行器调用的外部协作方
//!
//! 每个协作方都是 trait 对象，默认实现只依赖本地文件系统；
//! 真实的 LMS 与邮件投递不在本服务内。

use async_trait::async_trait;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::errors::{AutograderError, Result};
use crate::models::{
    course_users::entities::CourseUserRole,
    courses::entities::Course,
    logs::entities::{LogQuery, LogRecord},
    references::ParsedCourseUserReference,
    users::entities::{ServerUser, ServerUserRole},
};
use crate::storage::Storage;
use crate::storage::file_storage::{COURSES_DIRNAME, COURSE_FILENAME};
use crate::utils::archive::pack_dir;

pub const BACKUPS_DIRNAME: &str = "backups";

/// 课程备份
#[async_trait]
pub trait CourseBackup: Send + Sync {
    async fn backup(&self, course_id: &str) -> Result<PathBuf>;
}

/// 从本地源刷新课程
#[async_trait]
pub trait CourseUpdater: Send + Sync {
    async fn update_from_local_source(&self, course: &Course, context_user: &ServerUser) -> Result<()>;
}

/// 全课程评分并上传到 LMS
#[async_trait]
pub trait ScoringUploader: Send + Sync {
    async fn full_course_scoring_and_upload(&self, course: &Course, dry_run: bool) -> Result<()>;
}

/// 成绩报告
#[async_trait]
pub trait ReportBuilder: Send + Sync {
    async fn build_scoring_report_html(&self, course: &Course) -> Result<String>;
}

/// 应用日志查询
#[async_trait]
pub trait LogQuerier: Send + Sync {
    async fn query_logs(&self, query: &LogQuery, acting_user: &ServerUser) -> Result<Vec<LogRecord>>;
}

/// 邮件发送
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &[String], subject: &str, body: &str, is_html: bool) -> Result<()>;
}

/// 将课程目录打包到 `<base>/backups/<course>-<秒>.tar.gz`
pub struct TarBackup {
    base_dir: PathBuf,
}

impl TarBackup {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl CourseBackup for TarBackup {
    async fn backup(&self, course_id: &str) -> Result<PathBuf> {
        let course_dir = self.base_dir.join(COURSES_DIRNAME).join(course_id);
        if !course_dir.is_dir() {
            return Err(AutograderError::not_found(format!(
                "课程目录 '{}' 不存在",
                course_dir.display()
            )));
        }

        let backup_dir = self.base_dir.join(BACKUPS_DIRNAME);
        fs::create_dir_all(&backup_dir)?;

        let bytes = pack_dir(&course_dir)?;
        let path = backup_dir.join(format!("{}-{}.tar.gz", course_id, Utc::now().timestamp()));
        fs::write(&path, bytes).map_err(|e| {
            AutograderError::storage(format!("写入备份 '{}' 失败: {e}", path.display()))
        })?;

        info!(course_id, "课程备份完成: {}", path.display());
        Ok(path)
    }
}

/// 重新读取 course.json 并刷新课程任务
pub struct LocalCourseUpdater {
    storage: Arc<dyn Storage>,
}

impl LocalCourseUpdater {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CourseUpdater for LocalCourseUpdater {
    async fn update_from_local_source(&self, course: &Course, context_user: &ServerUser) -> Result<()> {
        if context_user.role < ServerUserRole::Admin {
            return Err(AutograderError::authorization(format!(
                "用户 '{}' 无权更新课程 '{}'",
                context_user.email, course.id
            )));
        }

        let fresh = self.storage.get_course(&course.id).await?.ok_or_else(|| {
            AutograderError::not_found(format!("课程 '{}' 的 {} 不存在", course.id, COURSE_FILENAME))
        })?;

        self.storage.upsert_course_tasks(&fresh).await?;
        info!(course_id = %course.id, "课程已从本地源刷新");
        Ok(())
    }
}

/// 未配置 LMS 时的评分上传
pub struct NoLmsScoringUploader;

#[async_trait]
impl ScoringUploader for NoLmsScoringUploader {
    async fn full_course_scoring_and_upload(&self, course: &Course, _dry_run: bool) -> Result<()> {
        Err(AutograderError::collaborator(format!(
            "课程 '{}' 未配置 LMS，无法上传成绩",
            course.id
        )))
    }
}

/// 基于提交存储生成的 HTML 成绩报告
pub struct StorageReportBuilder {
    storage: Arc<dyn Storage>,
}

impl StorageReportBuilder {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl ReportBuilder for StorageReportBuilder {
    /// 每位学生在每个作业上最近一次提交的得分
    async fn build_scoring_report_html(&self, course: &Course) -> Result<String> {
        let mut reference = ParsedCourseUserReference::default();
        reference.roles.insert(CourseUserRole::Student);

        let mut html = String::new();
        html.push_str(&format!(
            "<h1>Scoring Report: {}</h1>\n",
            escape_html(course.display_name())
        ));

        for assignment in course.assignments.values() {
            let scores = self
                .storage
                .get_scoring_infos(assignment, &reference)
                .await?;

            let submitted = scores.values().filter(|info| info.is_some()).count();
            html.push_str(&format!(
                "<h2>{}</h2>\n<p>{} / {} students submitted (max points: {})</p>\n",
                escape_html(assignment.display_name()),
                submitted,
                scores.len(),
                assignment.max_points
            ));

            html.push_str("<table>\n<tr><th>Email</th><th>Score</th><th>Submission</th></tr>\n");
            for (email, info) in &scores {
                let (score, id) = match info {
                    Some(info) => (info.score.to_string(), escape_html(&info.id)),
                    None => ("-".to_string(), String::new()),
                };
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    escape_html(email),
                    score,
                    id
                ));
            }
            html.push_str("</table>\n");
        }

        Ok(html)
    }
}

/// 从 `<base>/log.jsonl` 查询日志
pub struct StorageLogQuerier {
    storage: Arc<dyn Storage>,
}

impl StorageLogQuerier {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl LogQuerier for StorageLogQuerier {
    async fn query_logs(&self, query: &LogQuery, acting_user: &ServerUser) -> Result<Vec<LogRecord>> {
        let allowed = match &query.course_id {
            Some(course_id) => acting_user.effective_course_role(course_id) >= CourseUserRole::Admin,
            None => acting_user.role >= ServerUserRole::Admin,
        };

        if !allowed {
            return Err(AutograderError::authorization(format!(
                "用户 '{}' 无权查询这些日志",
                acting_user.email
            )));
        }

        self.storage.query_logs(query).await
    }
}

/// 只通过 tracing 记录邮件内容
pub struct TracingEmailSender;

#[async_trait]
impl EmailSender for TracingEmailSender {
    async fn send(&self, to: &[String], subject: &str, body: &str, is_html: bool) -> Result<()> {
        info!(
            to = ?to,
            subject,
            is_html,
            body_len = body.len(),
            "邮件已记录（未配置邮件投递）"
        );
        Ok(())
    }
}
