use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::collaborators::CourseBackup;
use super::{TaskRunner, load_task_course, task_context};
use crate::errors::Result;
use crate::models::tasks::entities::FullScheduledTask;
use crate::storage::Storage;

pub struct BackupRunner {
    storage: Arc<dyn Storage>,
    backup: Arc<dyn CourseBackup>,
}

impl BackupRunner {
    pub fn new(storage: Arc<dyn Storage>, backup: Arc<dyn CourseBackup>) -> Self {
        Self { storage, backup }
    }
}

#[async_trait]
impl TaskRunner for BackupRunner {
    async fn run(&self, task: &FullScheduledTask) -> Result<()> {
        let course = load_task_course(&self.storage, task).await?;

        let path = self
            .backup
            .backup(&course.id)
            .await
            .map_err(|e| e.context(task_context(task)))?;

        info!(course_id = %course.id, "备份任务完成: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tasks::entities::TaskType;
    use crate::services::tasks::collaborators::TarBackup;
    use crate::services::tasks::test_support::{full_task, user_task};
    use crate::storage::file_storage::{FileStorage, fixtures::TestStorage};

    #[tokio::test]
    async fn test_backup_runner_writes_archive() {
        let test = TestStorage::new().await;
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(test.dir.path()).unwrap());
        let runner = BackupRunner::new(storage, Arc::new(TarBackup::new(test.dir.path())));

        runner.run(&full_task(user_task(TaskType::Backup))).await.unwrap();

        let backups: Vec<_> = std::fs::read_dir(test.dir.path().join("backups"))
            .unwrap()
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_course_fails() {
        let test = TestStorage::new().await;
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(test.dir.path()).unwrap());
        let runner = BackupRunner::new(storage, Arc::new(TarBackup::new(test.dir.path())));

        let mut task = full_task(user_task(TaskType::Backup));
        task.system_info.course_id = Some("course999".to_string());
        let err = runner.run(&task).await.unwrap_err();
        assert_eq!(err.code(), "-042");
    }
}
