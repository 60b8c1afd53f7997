use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::collaborators::{EmailSender, LogQuerier};
use super::{
    EmailDeadlines, TaskRunner, load_task_course, resolve_recipients, send_email, task_context,
};
use crate::errors::Result;
use crate::models::{
    logs::entities::LogRecord, tasks::entities::FullScheduledTask, users::entities::ServerUser,
};
use crate::storage::Storage;

/// 查询课程日志并通过邮件发送
///
/// 查询没有时间窗口时，只取上次运行之后的日志。
pub struct EmailLogsRunner {
    storage: Arc<dyn Storage>,
    querier: Arc<dyn LogQuerier>,
    sender: Arc<dyn EmailSender>,
    deadlines: EmailDeadlines,
}

impl EmailLogsRunner {
    pub fn new(
        storage: Arc<dyn Storage>,
        querier: Arc<dyn LogQuerier>,
        sender: Arc<dyn EmailSender>,
        deadlines: EmailDeadlines,
    ) -> Self {
        Self {
            storage,
            querier,
            sender,
            deadlines,
        }
    }
}

fn format_records(records: &[LogRecord]) -> String {
    records
        .iter()
        .map(|record| {
            let mut line = format!(
                "{} [{}] {}",
                record.timestamp.to_rfc3339(),
                record.level,
                record.message
            );
            if let Some(user) = &record.user {
                line.push_str(&format!(" (user: {user})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl TaskRunner for EmailLogsRunner {
    async fn run(&self, task: &FullScheduledTask) -> Result<()> {
        let course = load_task_course(&self.storage, task).await?;
        let context = task_context(task);

        let mut query = task.user_info.log_query().map_err(|e| e.context(&context))?;
        let send_empty = task.user_info.send_empty().map_err(|e| e.context(&context))?;

        query.course_id = Some(course.id.clone());
        if !query.has_time_window() && task.system_info.last_run_time > DateTime::<Utc>::UNIX_EPOCH {
            query.after = Some(task.system_info.last_run_time);
        }

        let recipients = resolve_recipients(&self.storage, &course, task)
            .await
            .map_err(|e| e.context(&context))?;
        if recipients.is_empty() {
            warn!(course_id = %course.id, "日志邮件没有收件人，跳过发送");
            return Ok(());
        }

        let records = self
            .querier
            .query_logs(&query, &ServerUser::root())
            .await
            .map_err(|e| e.context(&context))?;

        if records.is_empty() && !send_empty {
            debug!(course_id = %course.id, "没有新的日志，跳过发送");
            return Ok(());
        }

        let subject = format!(
            "Autograder Logs for {}: {} record(s)",
            course.display_name(),
            records.len()
        );
        let body = if records.is_empty() {
            "No matching log records.".to_string()
        } else {
            format_records(&records)
        };

        send_email(&self.sender, self.deadlines, recipients, subject, body, false)
            .await
            .map_err(|e| e.context(&context))?;

        info!(course_id = %course.id, count = records.len(), "日志邮件已发送");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::logs::entities::LogLevel;
    use crate::models::tasks::entities::{OPTION_QUERY, OPTION_SEND_EMPTY, OPTION_TO, TaskType};
    use crate::services::tasks::collaborators::StorageLogQuerier;
    use crate::services::tasks::test_support::{
        RecordingEmailSender, deadlines, full_task, user_task,
    };
    use crate::storage::file_storage::{
        FileStorage,
        fixtures::{COURSE_ID, TestStorage},
    };

    fn logs_task(options: serde_json::Value) -> FullScheduledTask {
        let mut info = user_task(TaskType::EmailLogs);
        info.options.insert(OPTION_TO.to_string(), serde_json::json!(["owner"]));
        if let serde_json::Value::Object(map) = options {
            info.options.extend(map);
        }
        full_task(info)
    }

    async fn setup() -> (TestStorage, Arc<dyn Storage>, EmailLogsRunner, Arc<RecordingEmailSender>) {
        let test = TestStorage::new().await;
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(test.dir.path()).unwrap());
        let sender = Arc::new(RecordingEmailSender::default());
        let runner = EmailLogsRunner::new(
            storage.clone(),
            Arc::new(StorageLogQuerier::new(storage.clone())),
            sender.clone(),
            deadlines(),
        );
        (test, storage, runner, sender)
    }

    fn course_record(level: LogLevel, message: &str) -> LogRecord {
        let mut record = LogRecord::new(level, message);
        record.course_id = Some(COURSE_ID.to_string());
        record
    }

    #[tokio::test]
    async fn test_sends_matching_logs() {
        let (_test, storage, runner, sender) = setup().await;
        storage
            .append_logs(vec![
                course_record(LogLevel::Error, "grader crashed"),
                course_record(LogLevel::Debug, "noise"),
                LogRecord::new(LogLevel::Error, "other course"),
            ])
            .await
            .unwrap();

        runner
            .run(&logs_task(serde_json::json!({OPTION_QUERY: {"level": "warn"}})))
            .await
            .unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["course-owner@test.edulinq.org"]);
        assert!(sent[0].body.contains("grader crashed"));
        assert!(!sent[0].body.contains("noise"));
        assert!(!sent[0].body.contains("other course"));
        assert!(!sent[0].is_html);
    }

    #[tokio::test]
    async fn test_empty_logs_respect_send_empty() {
        let (_test, _storage, runner, sender) = setup().await;

        runner.run(&logs_task(serde_json::json!({}))).await.unwrap();
        assert!(sender.sent.lock().unwrap().is_empty());

        runner
            .run(&logs_task(serde_json::json!({OPTION_SEND_EMPTY: true})))
            .await
            .unwrap();
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_only_logs_since_last_run() {
        let (_test, storage, runner, sender) = setup().await;

        let mut old = course_record(LogLevel::Error, "old failure");
        old.timestamp = Utc::now() - chrono::Duration::hours(2);
        storage.append_logs(vec![old]).await.unwrap();

        let mut task = logs_task(serde_json::json!({}));
        task.system_info.last_run_time = Utc::now() - chrono::Duration::hours(1);

        runner.run(&task).await.unwrap();
        assert!(sender.sent.lock().unwrap().is_empty());
    }
}
