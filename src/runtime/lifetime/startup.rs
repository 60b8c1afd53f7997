use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::Result;
use crate::runtime::scheduler::{SchedulerSettings, TaskScheduler};
use crate::services::tasks::{Collaborators, EmailDeadlines, build_runner_table};
use crate::storage::Storage;

pub struct StartupContext {
    pub storage: Arc<dyn Storage>,
    pub scheduler: Arc<TaskScheduler>,
}

/// 检查用户表；没有任何用户时提示管理员导入
async fn check_users(storage: &Arc<dyn Storage>) -> Result<()> {
    let users = storage.get_server_users().await?;
    if users.is_empty() {
        warn!("No users found in users.json, all API requests will be rejected");
    } else {
        debug!("Loaded {} server user(s)", users.len());
    }
    Ok(())
}

/// 将所有课程声明的任务同步进任务表，并删除已消失课程的任务
async fn sync_course_tasks(storage: &Arc<dyn Storage>) -> Result<()> {
    let courses = storage.get_courses().await?;
    for course in &courses {
        if let Err(e) = storage.upsert_course_tasks(course).await {
            warn!(course_id = %course.id, "Failed to sync course tasks: {}", e);
        }
    }

    let course_ids: Vec<String> = courses.iter().map(|course| course.id.clone()).collect();
    let pruned = storage.prune_tasks(&course_ids).await?;
    if pruned > 0 {
        info!("Pruned {} task(s) of removed courses", pruned);
    }

    info!("Synced tasks for {} course(s)", courses.len());
    Ok(())
}

/// 准备服务器启动的上下文
/// 包括存储、任务表与调度器
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let config = AppConfig::get();

    let storage = crate::storage::create_storage().await?;
    warn!(
        "File storage initialized at '{}'",
        config.storage.base_dir
    );

    check_users(&storage).await?;
    sync_course_tasks(&storage).await?;

    let collaborators = Collaborators::local(storage.clone(), &config.storage.base_dir);
    let runners = build_runner_table(
        storage.clone(),
        collaborators,
        EmailDeadlines::from_config(config),
    );
    let scheduler = TaskScheduler::new(
        storage.clone(),
        runners,
        SchedulerSettings::from_config(config),
    );
    TaskScheduler::install(scheduler.clone())?;

    if config.scheduler.enabled {
        scheduler.start().await;
        warn!("Task scheduler started");
    } else {
        warn!("Task scheduler disabled by configuration");
    }

    Ok(StartupContext { storage, scheduler })
}
