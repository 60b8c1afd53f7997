use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AutograderError, Result};
use crate::models::common::FullSubmissionId;
use crate::utils::{is_email, validate_id};

/// 评分信息（submission-result.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GradingInfo {
    pub id: String,
    pub short_id: String,
    pub course_id: String,
    pub assignment_id: String,
    pub user: String,
    #[serde(default)]
    pub message: String,
    pub max_points: f64,
    pub score: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub grading_start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_user: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub proxy_start_time: Option<DateTime<Utc>>,
}

impl GradingInfo {
    pub fn full_id(&self) -> FullSubmissionId {
        FullSubmissionId::new(
            &self.course_id,
            &self.assignment_id,
            &self.user,
            &self.short_id,
        )
    }

    /// 保存前的检查：各段非空且属于给定课程
    pub fn validate_for_course(&self, course_id: &str) -> Result<()> {
        let blank = [
            ("course-id", &self.course_id),
            ("assignment-id", &self.assignment_id),
            ("user", &self.user),
            ("short-id", &self.short_id),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        if let Some((field, _)) = blank {
            return Err(AutograderError::validation(format!(
                "评分信息 '{}' 缺少字段 '{field}'",
                self.id
            )));
        }

        if self.course_id != course_id {
            return Err(AutograderError::validation(format!(
                "提交 '{}' 属于课程 '{}'，而非 '{course_id}'",
                self.id, self.course_id
            )));
        }

        // 以下各段会拼入提交目录路径
        if validate_id(&self.course_id)? != self.course_id
            || validate_id(&self.assignment_id)? != self.assignment_id
        {
            return Err(AutograderError::validation(format!(
                "提交 '{}' 的课程或作业 ID 不是规范形式",
                self.id
            )));
        }

        if !self.short_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AutograderError::validation(format!(
                "提交 '{}' 的短 ID '{}' 必须是十进制数字",
                self.id, self.short_id
            )));
        }

        if !is_email(&self.user) || self.user.contains(['/', '\\']) || self.user.trim() != self.user
        {
            return Err(AutograderError::validation(format!(
                "提交 '{}' 的用户 '{}' 不是合法的邮箱",
                self.id, self.user
            )));
        }

        Ok(())
    }
}

/// 一次评分的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GradingResult {
    pub info: GradingInfo,
    #[serde(default, with = "crate::utils::serde_base64")]
    pub input_files_gzip: Vec<u8>,
    #[serde(default, with = "crate::utils::serde_base64")]
    pub output_files_gzip: Vec<u8>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// 提交历史项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubmissionHistoryItem {
    pub id: String,
    pub short_id: String,
    pub course_id: String,
    pub assignment_id: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_user: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub proxy_start_time: Option<DateTime<Utc>>,
    pub message: String,
    pub max_points: f64,
    pub score: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub grading_start_time: DateTime<Utc>,
}

impl From<&GradingInfo> for SubmissionHistoryItem {
    fn from(info: &GradingInfo) -> Self {
        Self {
            id: info.id.clone(),
            short_id: info.short_id.clone(),
            course_id: info.course_id.clone(),
            assignment_id: info.assignment_id.clone(),
            user: info.user.clone(),
            proxy_user: info.proxy_user.clone(),
            proxy_start_time: info.proxy_start_time,
            message: info.message.clone(),
            max_points: info.max_points,
            score: info.score,
            grading_start_time: info.grading_start_time,
        }
    }
}

/// 上传到 LMS 的成绩信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScoringInfo {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub submission_time: DateTime<Utc>,
    pub raw_score: f64,
    pub score: f64,
}

impl From<&GradingInfo> for ScoringInfo {
    fn from(info: &GradingInfo) -> Self {
        Self {
            id: info.id.clone(),
            submission_time: info.grading_start_time,
            raw_score: info.score,
            score: info.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info() -> GradingInfo {
        GradingInfo {
            id: "course101::hw0::student@test.com::1697406256".to_string(),
            short_id: "1697406256".to_string(),
            course_id: "course101".to_string(),
            assignment_id: "hw0".to_string(),
            user: "student@test.com".to_string(),
            message: String::new(),
            max_points: 2.0,
            score: 1.0,
            grading_start_time: Utc.timestamp_millis_opt(1_697_406_256_000).unwrap(),
            proxy_user: None,
            proxy_start_time: None,
        }
    }

    #[test]
    fn test_validate_for_course() {
        assert!(info().validate_for_course("course101").is_ok());
        assert!(info().validate_for_course("course102").is_err());

        let mut blank = info();
        blank.short_id = " ".to_string();
        assert!(blank.validate_for_course("course101").is_err());
    }

    #[test]
    fn test_validate_rejects_path_segments() {
        for short_id in ["../../../../escaped", "12/34", "abc"] {
            let mut bad = info();
            bad.short_id = short_id.to_string();
            assert_eq!(bad.validate_for_course("course101").unwrap_err().code(), "-041");
        }

        let mut bad = info();
        bad.assignment_id = "../hw0".to_string();
        assert!(bad.validate_for_course("course101").is_err());

        let mut bad = info();
        bad.assignment_id = "HW0".to_string();
        assert!(bad.validate_for_course("course101").is_err());

        for user in ["../student@test.com", "a\\b@test.com", "student"] {
            let mut bad = info();
            bad.user = user.to_string();
            assert!(bad.validate_for_course("course101").is_err());
        }
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(info()).unwrap();
        assert_eq!(value["grading-start-time"], 1_697_406_256_000i64);
        assert_eq!(value["max-points"], 2.0);
        assert!(value.get("proxy-user").is_none());
    }

    #[test]
    fn test_history_projection() {
        let item = SubmissionHistoryItem::from(&info());
        assert_eq!(item.short_id, "1697406256");
        assert_eq!(item.score, 1.0);
        assert_eq!(item.grading_start_time, info().grading_start_time);
    }

    #[test]
    fn test_full_id() {
        assert_eq!(info().full_id().to_string(), info().id);
    }
}
