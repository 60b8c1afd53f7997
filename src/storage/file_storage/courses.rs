use std::fs;
use tracing::warn;

use super::{COURSE_FILENAME, FileStorage};
use crate::errors::{AutograderError, Result};
use crate::models::{course_users::entities::CourseUser, courses::entities::Course};
use crate::utils::{read_json_file, validate_id, write_json_file};

impl FileStorage {
    pub(crate) fn load_course(&self, course_id: &str) -> Result<Option<Course>> {
        let course_id = validate_id(course_id)?;
        let path = self.course_dir(&course_id).join(COURSE_FILENAME);

        let Some(mut course) = read_json_file::<Course>(&path)? else {
            return Ok(None);
        };

        course
            .validate()
            .map_err(|e| e.context(format!("课程文件 '{}'", path.display())))?;

        if course.id != course_id {
            return Err(AutograderError::validation(format!(
                "课程文件 '{}' 中的 ID '{}' 与目录名不一致",
                path.display(),
                course.id
            )));
        }

        Ok(Some(course))
    }

    /// 获取课程
    pub async fn get_course_impl(&self, course_id: &str) -> Result<Option<Course>> {
        let _guard = self.courses_lock.read().await;
        self.load_course(course_id)
    }

    /// 列出所有课程（按 ID 排序），无法加载的课程记录警告后跳过
    pub async fn get_courses_impl(&self) -> Result<Vec<Course>> {
        let _guard = self.courses_lock.read().await;

        let dir = self.courses_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut courses = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            match self.load_course(&name) {
                Ok(Some(course)) => courses.push(course),
                Ok(None) => {}
                Err(e) => warn!("跳过无法加载的课程 '{}': {}", name, e),
            }
        }

        courses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(courses)
    }

    /// 保存课程配置
    pub async fn save_course_impl(&self, course: &Course) -> Result<()> {
        let mut course = course.clone();
        course.validate()?;

        let _guard = self.courses_lock.write().await;
        let path = self.course_dir(&course.id).join(COURSE_FILENAME);
        write_json_file(&path, &course)
    }

    /// 课程成员（由 users.json 中的课程信息派生），按邮箱排序
    pub async fn get_course_users_impl(&self, course_id: &str) -> Result<Vec<CourseUser>> {
        let course_id = validate_id(course_id)?;
        let users = self.get_server_users_impl().await?;

        Ok(users
            .values()
            .filter_map(|user| user.to_course_user(&course_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{COURSE_ID, TestStorage};
    use crate::models::courses::entities::Course;

    #[tokio::test]
    async fn test_get_course() {
        let test = TestStorage::new().await;

        let course = test.storage.get_course_impl(COURSE_ID).await.unwrap().unwrap();
        assert_eq!(course.id, COURSE_ID);
        assert_eq!(course.get_assignment("hw0").unwrap().course_id, COURSE_ID);

        assert!(test.storage.get_course_impl("nope").await.unwrap().is_none());
        assert!(test.storage.get_course_impl("bad id").await.is_err());
    }

    #[tokio::test]
    async fn test_save_and_list_courses() {
        let test = TestStorage::new().await;

        let mut course = Course::new("course-languages");
        course.name = Some("Languages".to_string());
        test.storage.save_course_impl(&course).await.unwrap();

        let ids: Vec<String> = test
            .storage
            .get_courses_impl()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["course-languages", COURSE_ID]);
    }

    #[tokio::test]
    async fn test_course_users() {
        let test = TestStorage::new().await;
        let users = test.storage.get_course_users_impl(COURSE_ID).await.unwrap();
        assert_eq!(users.len(), 5);
        assert!(users.windows(2).all(|w| w[0].email < w[1].email));
    }
}
