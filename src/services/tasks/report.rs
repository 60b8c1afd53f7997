use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::collaborators::{EmailSender, ReportBuilder};
use super::{
    EmailDeadlines, TaskRunner, load_task_course, resolve_recipients, send_email, task_context,
};
use crate::errors::Result;
use crate::models::tasks::entities::FullScheduledTask;
use crate::storage::Storage;

/// 生成成绩报告并发送给 `to` 所指的课程成员
pub struct ReportRunner {
    storage: Arc<dyn Storage>,
    builder: Arc<dyn ReportBuilder>,
    sender: Arc<dyn EmailSender>,
    deadlines: EmailDeadlines,
}

impl ReportRunner {
    pub fn new(
        storage: Arc<dyn Storage>,
        builder: Arc<dyn ReportBuilder>,
        sender: Arc<dyn EmailSender>,
        deadlines: EmailDeadlines,
    ) -> Self {
        Self {
            storage,
            builder,
            sender,
            deadlines,
        }
    }
}

#[async_trait]
impl TaskRunner for ReportRunner {
    async fn run(&self, task: &FullScheduledTask) -> Result<()> {
        let course = load_task_course(&self.storage, task).await?;
        let context = task_context(task);

        let recipients = resolve_recipients(&self.storage, &course, task)
            .await
            .map_err(|e| e.context(&context))?;
        if recipients.is_empty() {
            warn!(course_id = %course.id, "成绩报告没有收件人，跳过发送");
            return Ok(());
        }

        let html = self
            .builder
            .build_scoring_report_html(&course)
            .await
            .map_err(|e| e.context(&context))?;

        let subject = format!("Autograder Scoring Report for {}", course.display_name());
        send_email(&self.sender, self.deadlines, recipients, subject, html, true)
            .await
            .map_err(|e| e.context(&context))?;

        info!(course_id = %course.id, "成绩报告已发送");
        Ok(())
    }
}
