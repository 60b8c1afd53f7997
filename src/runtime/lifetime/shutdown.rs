use tokio::signal;
use tracing::{error, warn};

use crate::runtime::scheduler::TaskScheduler;

pub async fn listen_for_shutdown() {
    // 等待 Ctrl+C 信号
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    warn!("Shutdown signal received, initiating graceful shutdown...");
}

/// 停止任务调度，等待正在运行的任务结束
pub async fn stop_background_tasks() {
    if let Some(scheduler) = TaskScheduler::global() {
        scheduler.stop().await;
        warn!("Task scheduler stopped");
    }
}
