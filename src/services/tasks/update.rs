use async_trait::async_trait;
use std::sync::Arc;

use super::collaborators::CourseUpdater;
use super::{TaskRunner, load_task_course, task_context};
use crate::errors::Result;
use crate::models::{tasks::entities::FullScheduledTask, users::entities::ServerUser};
use crate::storage::Storage;

/// 以根用户身份从本地源刷新课程
pub struct UpdateRunner {
    storage: Arc<dyn Storage>,
    updater: Arc<dyn CourseUpdater>,
}

impl UpdateRunner {
    pub fn new(storage: Arc<dyn Storage>, updater: Arc<dyn CourseUpdater>) -> Self {
        Self { storage, updater }
    }
}

#[async_trait]
impl TaskRunner for UpdateRunner {
    async fn run(&self, task: &FullScheduledTask) -> Result<()> {
        let course = load_task_course(&self.storage, task).await?;
        self.updater
            .update_from_local_source(&course, &ServerUser::root())
            .await
            .map_err(|e| e.context(task_context(task)))
    }
}
