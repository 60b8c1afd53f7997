//! 定时任务调度器
//!
//! 单个后台循环：取出下次运行时间最早的启用任务，到期则分派给对应的运行器，
//! 运行结束后更新运行时间并持久化。同一时刻最多只有一个任务在运行。

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::poll_fn;
use std::any::Any;
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::errors::{AutograderError, Result};
use crate::models::tasks::entities::FullScheduledTask;
use crate::services::tasks::RunnerTable;
use crate::storage::Storage;

static SCHEDULER: OnceLock<Arc<TaskScheduler>> = OnceLock::new();

thread_local! {
    // 当前线程是否正在 poll 运行器
    static IN_RUNNER: Cell<bool> = const { Cell::new(false) };
}

/// 当前线程是否正在执行运行器代码
pub fn in_runner() -> bool {
    IN_RUNNER.with(Cell::get)
}

// poll 结束或 panic 展开时复位
struct RunnerMark;

impl RunnerMark {
    fn set() -> Self {
        IN_RUNNER.with(|flag| flag.set(true));
        RunnerMark
    }
}

impl Drop for RunnerMark {
    fn drop(&mut self) {
        IN_RUNNER.with(|flag| flag.set(false));
    }
}

/// 在现有 panic hook 之前过滤运行器内的 panic
///
/// 运行器的 panic 会被调度器捕获并记录，这里只留一条 debug 日志，
/// 其余 panic 仍交给原来的 hook（例如 human-panic 的崩溃报告）。
pub fn install_panic_filter() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if in_runner() {
            debug!("运行器 panic: {}", info);
            return;
        }
        previous(info);
    }));
}

/// 轮询等待时间的上下限
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_wait: Duration::from_millis(config.scheduler.min_wait_ms),
            max_wait: Duration::from_millis(config.scheduler.max_wait_ms),
        }
    }

    /// 距离下次运行的等待时间，限制在 [min_wait, max_wait] 内
    pub fn wait_until(&self, next_run_time: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let remaining = (next_run_time - now).to_std().unwrap_or(Duration::ZERO);
        remaining.clamp(self.min_wait, self.max_wait.max(self.min_wait))
    }
}

struct SchedulerState {
    enabled: bool,
}

pub struct TaskScheduler {
    storage: Arc<dyn Storage>,
    runners: RunnerTable,
    settings: SchedulerSettings,
    // 同时保护 enabled 标志与每一轮分派
    state: Mutex<SchedulerState>,
    wake: Notify,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl TaskScheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        runners: RunnerTable,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage,
            runners,
            settings,
            state: Mutex::new(SchedulerState { enabled: false }),
            wake: Notify::new(),
            handle: std::sync::Mutex::new(None),
        })
    }

    /// 注册进程级调度器，只能注册一次
    pub fn install(scheduler: Arc<TaskScheduler>) -> Result<()> {
        SCHEDULER
            .set(scheduler)
            .map_err(|_| AutograderError::config("任务调度器已经注册"))
    }

    /// 进程级调度器
    pub fn global() -> Option<Arc<TaskScheduler>> {
        SCHEDULER.get().cloned()
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    pub async fn enable(&self) {
        self.state.lock().await.enabled = true;
    }

    /// 唤醒等待中的调度循环（例如任务列表刚刚改变）
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// 执行一轮调度，返回下一轮之前应等待的时间
    pub async fn run_once(&self) -> Result<Duration> {
        let state = self.state.lock().await;
        if !state.enabled {
            return Ok(self.settings.max_wait);
        }

        let Some(mut task) = self.storage.get_next_active_task().await? else {
            return Ok(self.settings.max_wait);
        };

        let now = Utc::now();
        if task.system_info.next_run_time > now {
            return Ok(self.settings.wait_until(task.system_info.next_run_time, now));
        }

        self.dispatch(&task).await;

        if let Err(e) = task.mark_ran(Utc::now()) {
            error!(
                task_type = %task.task_type(),
                course_id = %task.course_id(),
                task_hash = %task.hash(),
                "无法计算下次运行时间，任务将不再运行: {}",
                e
            );
            task.system_info.next_run_time = DateTime::<Utc>::MAX_UTC;
        }
        self.storage.save_task(&task).await?;

        drop(state);
        Ok(Duration::ZERO)
    }

    /// 分派任务；运行器的错误与 panic 只记录日志
    async fn dispatch(&self, task: &FullScheduledTask) {
        let task_type = task.task_type();
        let Some(runner) = self.runners.get(&task_type) else {
            warn!(
                task_type = %task_type,
                course_id = %task.course_id(),
                "没有为该任务类型注册运行器"
            );
            return;
        };

        debug!(
            task_type = %task_type,
            course_id = %task.course_id(),
            task_hash = %task.hash(),
            "开始运行任务 '{}'",
            task.user_info.name
        );

        let mut running = runner.run(task);
        let marked = poll_fn(move |cx| {
            let _mark = RunnerMark::set();
            running.as_mut().poll(cx)
        });
        let outcome = AssertUnwindSafe(marked).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(AutograderError::task_panic(panic_message(payload.as_ref()))),
        };

        match result {
            Ok(()) => info!(
                task_type = %task_type,
                course_id = %task.course_id(),
                task_hash = %task.hash(),
                "任务运行完成"
            ),
            Err(e) => error!(
                task_type = %task_type,
                course_id = %task.course_id(),
                task_hash = %task.hash(),
                locator = e.code(),
                "任务运行失败: {}",
                e.message()
            ),
        }
    }

    async fn run_loop(self: Arc<Self>) {
        info!("任务调度器已启动");

        loop {
            let wait = match self.run_once().await {
                Ok(wait) => wait,
                Err(e) => {
                    error!("任务调度出错: {}", e);
                    self.settings.max_wait
                }
            };

            if !self.is_enabled().await {
                break;
            }

            if wait > Duration::ZERO {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.wake.notified() => {}
                }
            }
        }

        info!("任务调度器已停止");
    }

    /// 启动后台调度循环；已经在运行时不做任何事
    pub async fn start(self: &Arc<Self>) {
        self.enable().await;

        let mut handle = match self.handle.lock() {
            Ok(handle) => handle,
            Err(poisoned) => poisoned.into_inner(),
        };
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *handle = Some(tokio::spawn(self.clone().run_loop()));
    }

    /// 停止调度
    ///
    /// 正在运行的任务不会被取消；返回时调度循环已经退出。
    pub async fn stop(&self) {
        // 拿到锁意味着当前没有任务在运行
        self.state.lock().await.enabled = false;
        self.wake.notify_one();

        let handle = match self.handle.lock() {
            Ok(mut handle) => handle.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!("等待任务调度器退出失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tasks::{
        entities::{TaskType, UserTaskInfo},
        schedule::{DurationSpec, ScheduleSpec},
    };
    use crate::services::tasks::{TaskRunner, test::TestRunner};
    use crate::storage::file_storage::{
        FileStorage,
        fixtures::{COURSE_ID, TestStorage},
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            min_wait: Duration::from_millis(10),
            max_wait: Duration::from_millis(100),
        }
    }

    async fn due_task(storage: &Arc<dyn Storage>, task_type: TaskType, name: &str) -> FullScheduledTask {
        let mut info = UserTaskInfo::new(
            task_type,
            ScheduleSpec::Every(DurationSpec {
                hours: 1,
                ..Default::default()
            }),
        );
        info.name = name.to_string();

        let mut task = FullScheduledTask::from_course_task(&info, COURSE_ID, "test", Utc::now()).unwrap();
        task.system_info.next_run_time = DateTime::<Utc>::UNIX_EPOCH;
        storage.save_task(&task).await.unwrap();
        task
    }

    async fn setup() -> (TestStorage, Arc<dyn Storage>) {
        let test = TestStorage::new().await;
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(test.dir.path()).unwrap());
        (test, storage)
    }

    struct PanicRunner;

    #[async_trait]
    impl TaskRunner for PanicRunner {
        async fn run(&self, _task: &FullScheduledTask) -> Result<()> {
            panic!("runner exploded");
        }
    }

    #[derive(Default)]
    struct ConcurrencyRunner {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskRunner for ConcurrencyRunner {
        async fn run(&self, _task: &FullScheduledTask) -> Result<()> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct SlowRunner {
        started: AtomicBool,
        finished: AtomicBool,
    }

    #[async_trait]
    impl TaskRunner for SlowRunner {
        async fn run(&self, _task: &FullScheduledTask) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MarkRunner {
        marked: AtomicBool,
    }

    #[async_trait]
    impl TaskRunner for MarkRunner {
        async fn run(&self, _task: &FullScheduledTask) -> Result<()> {
            tokio::task::yield_now().await;
            self.marked.store(in_runner(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_wait_is_clamped() {
        let now = Utc::now();
        let s = settings();
        assert_eq!(s.wait_until(now, now), s.min_wait);
        assert_eq!(s.wait_until(now - chrono::Duration::hours(1), now), s.min_wait);
        assert_eq!(s.wait_until(now + chrono::Duration::hours(1), now), s.max_wait);
        assert_eq!(
            s.wait_until(now + chrono::Duration::milliseconds(50), now),
            Duration::from_millis(50)
        );
    }

    #[tokio::test]
    async fn test_single_shot() {
        let (_test, storage) = setup().await;
        due_task(&storage, TaskType::Test, "observe").await;

        let runner = Arc::new(TestRunner::new());
        let mut runners: RunnerTable = HashMap::new();
        runners.insert(TaskType::Test, runner.clone());

        let scheduler = TaskScheduler::new(storage.clone(), runners, settings());
        scheduler.enable().await;

        let before = Utc::now();
        assert_eq!(runner.calls(), 0);
        scheduler.run_once().await.unwrap();
        assert_eq!(runner.calls(), 1);

        let task = storage.get_tasks().await.unwrap().remove(0);
        assert!(task.system_info.last_run_time.timestamp_millis() >= before.timestamp_millis());
        assert!(task.system_info.next_run_time > Utc::now());

        // 任务已不再到期
        scheduler.run_once().await.unwrap();
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_does_nothing() {
        let (_test, storage) = setup().await;
        due_task(&storage, TaskType::Test, "observe").await;

        let runner = Arc::new(TestRunner::new());
        let mut runners: RunnerTable = HashMap::new();
        runners.insert(TaskType::Test, runner.clone());

        let scheduler = TaskScheduler::new(storage, runners, settings());
        let wait = scheduler.run_once().await.unwrap();
        assert_eq!(wait, settings().max_wait);
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn test_panic_does_not_stop_scheduling() {
        let (_test, storage) = setup().await;
        due_task(&storage, TaskType::Test, "explodes").await;
        due_task(&storage, TaskType::Backup, "counts").await;

        let counter = Arc::new(TestRunner::new());
        let mut runners: RunnerTable = HashMap::new();
        runners.insert(TaskType::Test, Arc::new(PanicRunner));
        runners.insert(TaskType::Backup, counter.clone());

        let scheduler = TaskScheduler::new(storage.clone(), runners, settings());
        scheduler.enable().await;

        scheduler.run_once().await.unwrap();
        scheduler.run_once().await.unwrap();

        assert_eq!(counter.calls(), 1);
        let tasks = storage.get_tasks().await.unwrap();
        assert!(tasks.iter().all(|t| t.system_info.next_run_time > Utc::now()));
    }

    #[tokio::test]
    async fn test_at_most_one_task_in_flight() {
        let (_test, storage) = setup().await;
        for name in ["a", "b", "c", "d"] {
            due_task(&storage, TaskType::Test, name).await;
        }

        let runner = Arc::new(ConcurrencyRunner::default());
        let mut runners: RunnerTable = HashMap::new();
        runners.insert(TaskType::Test, runner.clone());

        let scheduler = TaskScheduler::new(storage, runners, settings());
        scheduler.enable().await;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.run_once().await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loop_runs_and_stops() {
        let (_test, storage) = setup().await;
        due_task(&storage, TaskType::Test, "loop").await;

        let runner = Arc::new(TestRunner::new());
        let mut runners: RunnerTable = HashMap::new();
        runners.insert(TaskType::Test, runner.clone());

        let scheduler = TaskScheduler::new(storage, runners, settings());
        scheduler.start().await;

        for _ in 0..100 {
            if runner.calls() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runner.calls(), 1);

        scheduler.stop().await;
        assert!(!scheduler.is_enabled().await);

        let wait = scheduler.run_once().await.unwrap();
        assert_eq!(wait, settings().max_wait);
    }

    #[tokio::test]
    async fn test_stop_waits_for_running_task() {
        let (_test, storage) = setup().await;
        due_task(&storage, TaskType::Test, "slow").await;

        let runner = Arc::new(SlowRunner::default());
        let mut runners: RunnerTable = HashMap::new();
        runners.insert(TaskType::Test, runner.clone());

        let scheduler = TaskScheduler::new(storage.clone(), runners, settings());
        scheduler.start().await;

        for _ in 0..100 {
            if runner.started.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(runner.started.load(Ordering::SeqCst));
        assert!(!runner.finished.load(Ordering::SeqCst));

        scheduler.stop().await;
        assert!(runner.finished.load(Ordering::SeqCst));
        assert!(!scheduler.is_enabled().await);
        assert!(scheduler.handle.lock().unwrap().is_none());

        // 运行结果已经持久化
        let task = storage.get_tasks().await.unwrap().remove(0);
        assert!(task.system_info.next_run_time > Utc::now());
    }

    #[tokio::test]
    async fn test_runner_mark_is_scoped() {
        let (_test, storage) = setup().await;
        due_task(&storage, TaskType::Test, "marked").await;
        due_task(&storage, TaskType::Backup, "explodes").await;

        let runner = Arc::new(MarkRunner::default());
        let mut runners: RunnerTable = HashMap::new();
        runners.insert(TaskType::Test, runner.clone());
        runners.insert(TaskType::Backup, Arc::new(PanicRunner));

        let scheduler = TaskScheduler::new(storage, runners, settings());
        scheduler.enable().await;

        assert!(!in_runner());
        scheduler.run_once().await.unwrap();
        scheduler.run_once().await.unwrap();

        assert!(runner.marked.load(Ordering::SeqCst));
        assert!(!in_runner());
    }
}
