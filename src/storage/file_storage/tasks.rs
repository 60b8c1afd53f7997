use chrono::Utc;
use tracing::{debug, warn};

use super::{COURSE_FILENAME, FileStorage};
use crate::errors::Result;
use crate::models::{courses::entities::Course, tasks::entities::FullScheduledTask};
use crate::utils::{read_json_file, write_json_file};

impl FileStorage {
    fn load_tasks(&self) -> Result<Vec<FullScheduledTask>> {
        Ok(read_json_file(&self.tasks_path())?.unwrap_or_default())
    }

    fn write_tasks(&self, tasks: &[FullScheduledTask]) -> Result<()> {
        write_json_file(&self.tasks_path(), &tasks)
    }

    /// 根据课程配置刷新该课程的任务
    ///
    /// 哈希相同的已有任务沿用其运行时间；课程中已不存在的任务被删除；
    /// 无效的任务记录警告后跳过。
    pub async fn upsert_course_tasks_impl(&self, course: &Course) -> Result<()> {
        let _guard = self.tasks_lock.lock().await;

        let now = Utc::now();
        let source = format!("{}/{}", course.id, COURSE_FILENAME);
        let (existing, mut tasks): (Vec<_>, Vec<_>) = self
            .load_tasks()?
            .into_iter()
            .partition(|task| task.course_id() == course.id);

        let mut fresh: Vec<FullScheduledTask> = Vec::new();
        for user_info in &course.tasks {
            let mut task = FullScheduledTask::from_course_task(user_info, &course.id, &source, now)?;
            if let Err(e) = task.validate() {
                warn!(course_id = %course.id, "跳过无效的任务 '{}': {}", user_info.name, e);
                continue;
            }

            if fresh.iter().any(|other| other.same_task(&task)) {
                continue;
            }

            if let Some(old) = existing.iter().find(|old| old.same_task(&task)) {
                task.system_info.merge_times(&old.system_info);
            }
            fresh.push(task);
        }

        debug!(
            course_id = %course.id,
            "刷新课程任务：原有 {} 个，现有 {} 个",
            existing.len(),
            fresh.len()
        );

        tasks.extend(fresh);
        self.write_tasks(&tasks)
    }

    pub async fn get_tasks_impl(&self) -> Result<Vec<FullScheduledTask>> {
        let _guard = self.tasks_lock.lock().await;
        self.load_tasks()
    }

    /// 下次运行时间最早的启用任务
    pub async fn get_next_active_task_impl(&self) -> Result<Option<FullScheduledTask>> {
        let _guard = self.tasks_lock.lock().await;
        Ok(self
            .load_tasks()?
            .into_iter()
            .filter(FullScheduledTask::is_active)
            .min_by_key(|task| task.system_info.next_run_time))
    }

    /// 保存任务；同一课程中哈希相同的任务被替换
    pub async fn save_task_impl(&self, task: &FullScheduledTask) -> Result<()> {
        let _guard = self.tasks_lock.lock().await;

        let mut tasks = self.load_tasks()?;
        match tasks.iter_mut().find(|other| other.same_task(task)) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }

        self.write_tasks(&tasks)
    }

    /// 删除课程已不存在的任务
    pub async fn prune_tasks_impl(&self, course_ids: &[String]) -> Result<usize> {
        let _guard = self.tasks_lock.lock().await;

        let mut tasks = self.load_tasks()?;
        let before = tasks.len();
        tasks.retain(|task| course_ids.iter().any(|id| *id == task.course_id()));

        let removed = before - tasks.len();
        if removed > 0 {
            debug!("删除 {} 个所属课程已不存在的任务", removed);
            self.write_tasks(&tasks)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{COURSE_ID, TestStorage, course};
    use crate::models::tasks::{
        entities::{TaskType, UserTaskInfo},
        schedule::{DurationSpec, ScheduleSpec},
    };
    use chrono::{DateTime, Duration, Utc};

    fn every(minutes: u64) -> ScheduleSpec {
        ScheduleSpec::Every(DurationSpec {
            minutes,
            ..Default::default()
        })
    }

    fn task(name: &str, minutes: u64) -> UserTaskInfo {
        let mut task = UserTaskInfo::new(TaskType::Backup, every(minutes));
        task.name = name.to_string();
        task
    }

    #[tokio::test]
    async fn test_upsert_and_next_active() {
        let test = TestStorage::new().await;
        let mut course = course();
        course.tasks = vec![task("slow", 60), task("fast", 5)];

        test.storage.upsert_course_tasks_impl(&course).await.unwrap();

        let tasks = test.storage.get_tasks_impl().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.course_id() == COURSE_ID));

        let next = test.storage.get_next_active_task_impl().await.unwrap().unwrap();
        assert_eq!(next.user_info.name, "fast");
    }

    #[tokio::test]
    async fn test_disabled_tasks_not_active() {
        let test = TestStorage::new().await;
        let mut course = course();
        let mut disabled = task("off", 1);
        disabled.disabled = true;
        course.tasks = vec![disabled];

        test.storage.upsert_course_tasks_impl(&course).await.unwrap();
        assert!(test.storage.get_next_active_task_impl().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reload_keeps_run_times() {
        let test = TestStorage::new().await;
        let mut course = course();
        course.tasks = vec![task("backup", 60)];
        test.storage.upsert_course_tasks_impl(&course).await.unwrap();

        // 模拟一次运行
        let mut saved = test.storage.get_tasks_impl().await.unwrap().remove(0);
        let last_run = Utc::now() - Duration::minutes(1);
        let next_run = Utc::now() + Duration::minutes(10);
        saved.system_info.last_run_time = last_run;
        saved.system_info.next_run_time = next_run;
        test.storage.save_task_impl(&saved).await.unwrap();

        test.storage.upsert_course_tasks_impl(&course).await.unwrap();
        let reloaded = test.storage.get_tasks_impl().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded[0].system_info.last_run_time.timestamp_millis(),
            last_run.timestamp_millis()
        );
        assert_eq!(
            reloaded[0].system_info.next_run_time.timestamp_millis(),
            next_run.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_removed_and_invalid_tasks_dropped() {
        let test = TestStorage::new().await;
        let mut course = course();
        course.tasks = vec![task("a", 10), task("b", 20)];
        test.storage.upsert_course_tasks_impl(&course).await.unwrap();

        let mut invalid = task("c", 1);
        invalid.when = Some(ScheduleSpec::Daily("99:00".to_string()));
        course.tasks = vec![task("a", 10), invalid];
        test.storage.upsert_course_tasks_impl(&course).await.unwrap();

        let names: Vec<String> = test
            .storage
            .get_tasks_impl()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.user_info.name)
            .collect();
        assert_eq!(names, vec!["a"]);
    }

    #[tokio::test]
    async fn test_other_courses_untouched() {
        let test = TestStorage::new().await;

        let mut other = crate::models::courses::entities::Course::new("course-languages");
        other.tasks = vec![task("x", 10)];
        test.storage.upsert_course_tasks_impl(&other).await.unwrap();

        let mut course = course();
        course.tasks = vec![task("y", 10)];
        test.storage.upsert_course_tasks_impl(&course).await.unwrap();

        let tasks = test.storage.get_tasks_impl().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.system_info.next_run_time < DateTime::<Utc>::MAX_UTC));
    }

    #[tokio::test]
    async fn test_prune_vanished_courses() {
        let test = TestStorage::new().await;

        let mut other = crate::models::courses::entities::Course::new("course-gone");
        other.tasks = vec![task("x", 10)];
        test.storage.upsert_course_tasks_impl(&other).await.unwrap();

        let mut course = course();
        course.tasks = vec![task("y", 10)];
        test.storage.upsert_course_tasks_impl(&course).await.unwrap();

        let removed = test
            .storage
            .prune_tasks_impl(&[COURSE_ID.to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let tasks = test.storage.get_tasks_impl().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].course_id(), COURSE_ID);

        assert_eq!(
            test.storage.prune_tasks_impl(&[COURSE_ID.to_string()]).await.unwrap(),
            0
        );
        assert_eq!(test.storage.prune_tasks_impl(&[]).await.unwrap(), 1);
        assert!(test.storage.get_tasks_impl().await.unwrap().is_empty());
    }
}
