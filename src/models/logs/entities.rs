use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::Result;
use crate::models::tasks::schedule::DurationSpec;

// 日志级别，按严重程度从低到高排列
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        write!(f, "{text}")
    }
}

// 应用日志记录（log.jsonl 中的一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            course_id: None,
            assignment_id: None,
            user: None,
            attributes: BTreeMap::new(),
        }
    }
}

// 日志查询条件
//
// `after` 与 `past` 同时给出时取较晚的起点。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogQuery {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub past: Option<DurationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
}

impl LogQuery {
    pub fn has_time_window(&self) -> bool {
        self.after.is_some() || self.past.is_some()
    }

    /// 查询起点（不含）
    pub fn start_time(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let from_past = match &self.past {
            Some(past) => Some(now - past.to_duration()?),
            None => None,
        };
        Ok(self.after.max(from_past))
    }

    pub fn matches(&self, record: &LogRecord, start: Option<DateTime<Utc>>) -> bool {
        if record.level < self.level {
            return false;
        }
        if let Some(start) = start
            && record.timestamp <= start
        {
            return false;
        }
        if self.course_id.is_some() && record.course_id != self.course_id {
            return false;
        }
        if self.assignment_id.is_some() && record.assignment_id != self.assignment_id {
            return false;
        }
        if self.target_user.is_some() && record.user != self.target_user {
            return false;
        }
        true
    }
}
