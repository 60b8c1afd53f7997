use async_trait::async_trait;
use std::sync::Arc;

use super::collaborators::ScoringUploader;
use super::{TaskRunner, load_task_course, task_context};
use crate::errors::Result;
use crate::models::tasks::entities::FullScheduledTask;
use crate::storage::Storage;

pub struct ScoringUploadRunner {
    storage: Arc<dyn Storage>,
    uploader: Arc<dyn ScoringUploader>,
}

impl ScoringUploadRunner {
    pub fn new(storage: Arc<dyn Storage>, uploader: Arc<dyn ScoringUploader>) -> Self {
        Self { storage, uploader }
    }
}

#[async_trait]
impl TaskRunner for ScoringUploadRunner {
    async fn run(&self, task: &FullScheduledTask) -> Result<()> {
        let course = load_task_course(&self.storage, task).await?;
        self.uploader
            .full_course_scoring_and_upload(&course, false)
            .await
            .map_err(|e| e.context(task_context(task)))
    }
}
