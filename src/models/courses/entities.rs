use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{AutograderError, Result};
use crate::models::tasks::entities::UserTaskInfo;
use crate::utils::validate_id;

// 作业
//
// 作业只记录所属课程的 ID，需要课程时通过存储查找。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Assignment {
    pub id: String,
    #[serde(skip)]
    pub course_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub max_points: f64,
}

impl Assignment {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// 课程（course.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Course {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub assignments: BTreeMap<String, Assignment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<UserTaskInfo>,
}

impl Course {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            assignments: BTreeMap::new(),
            tasks: Vec::new(),
        }
    }

    /// 校验并规范化课程
    ///
    /// 作业 ID 规范化后回填所属课程；任务逐个校验。
    pub fn validate(&mut self) -> Result<()> {
        self.id = validate_id(&self.id)?;

        let mut assignments = BTreeMap::new();
        for (key, mut assignment) in std::mem::take(&mut self.assignments) {
            let id = validate_id(if assignment.id.is_empty() {
                &key
            } else {
                &assignment.id
            })?;

            if assignment.max_points < 0.0 {
                return Err(AutograderError::validation(format!(
                    "作业 '{}' 的满分不能为负数",
                    id
                )));
            }

            assignment.id = id.clone();
            assignment.course_id = self.id.clone();
            if assignments.insert(id.clone(), assignment).is_some() {
                return Err(AutograderError::validation(format!(
                    "课程 '{}' 中作业 '{}' 重复",
                    self.id, id
                )));
            }
        }
        self.assignments = assignments;

        for task in &self.tasks {
            task.validate()
                .map_err(|e| e.context(format!("课程 '{}'", self.id)))?;
        }

        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn get_assignment(&self, assignment_id: &str) -> Option<&Assignment> {
        self.assignments.get(assignment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_backfills_course_id() {
        let mut course: Course = serde_json::from_str(
            r#"{
                "id": "Course101",
                "name": "Course 101",
                "assignments": {
                    "hw0": {"id": "HW0", "max-points": 2}
                }
            }"#,
        )
        .unwrap();

        course.validate().unwrap();
        assert_eq!(course.id, "course101");

        let hw0 = course.get_assignment("hw0").unwrap();
        assert_eq!(hw0.course_id, "course101");
        assert_eq!(hw0.max_points, 2.0);
    }

    #[test]
    fn test_course_id_not_serialized_on_assignment() {
        let mut course = Course::new("course101");
        course.assignments.insert(
            "hw0".to_string(),
            Assignment {
                id: "hw0".to_string(),
                course_id: "course101".to_string(),
                name: None,
                max_points: 2.0,
            },
        );

        let text = serde_json::to_string(&course).unwrap();
        assert!(!text.contains("course-id"));
    }

    #[test]
    fn test_invalid_task_rejected() {
        let mut course: Course = serde_json::from_str(
            r#"{"id": "course101", "tasks": [{"type": "report", "when": {"every": {"hours": 1}}}]}"#,
        )
        .unwrap();
        let err = course.validate().unwrap_err();
        assert_eq!(err.code(), "-041");
    }
}
