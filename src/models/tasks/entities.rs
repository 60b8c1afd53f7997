use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::errors::{AutograderError, Result};
use crate::models::logs::entities::LogQuery;
use crate::models::tasks::schedule::ScheduleSpec;

pub const OPTION_TO: &str = "to";
pub const OPTION_QUERY: &str = "query";
pub const OPTION_SEND_EMPTY: &str = "send-empty";

// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    Backup,
    EmailLogs,
    Report,
    ScoringUpload,
    Update,
    Test,
}

impl TaskType {
    pub fn all() -> &'static [TaskType] {
        &[
            Self::Backup,
            Self::EmailLogs,
            Self::Report,
            Self::ScoringUpload,
            Self::Update,
            Self::Test,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Backup => "backup",
            TaskType::EmailLogs => "email-logs",
            TaskType::Report => "report",
            TaskType::ScoringUpload => "scoring-upload",
            TaskType::Update => "update",
            TaskType::Test => "test",
        }
    }

    /// 该类型允许出现的选项
    fn allowed_options(&self) -> &'static [&'static str] {
        match self {
            TaskType::Report => &[OPTION_TO],
            TaskType::EmailLogs => &[OPTION_TO, OPTION_QUERY, OPTION_SEND_EMPTY],
            _ => &[],
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        TaskType::all()
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid task type: {s}"))
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// 用户定义的任务（来自 course.json）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserTaskInfo {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<ScheduleSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl UserTaskInfo {
    pub fn new(task_type: TaskType, when: ScheduleSpec) -> Self {
        Self {
            task_type,
            name: String::new(),
            disabled: false,
            when: Some(when),
            options: BTreeMap::new(),
        }
    }

    /// 校验任务选项（不包含调度时间）
    pub fn validate(&self) -> Result<()> {
        let allowed = self.task_type.allowed_options();
        for key in self.options.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(self.error(format!("不支持的选项 '{key}'")));
            }
        }

        match self.task_type {
            TaskType::Report => {
                self.validate_to()?;
            }
            TaskType::EmailLogs => {
                self.validate_to()?;
                self.log_query()?;
                self.send_empty()?;
            }
            _ => {}
        }

        Ok(())
    }

    fn validate_to(&self) -> Result<()> {
        let to = self.to()?;
        if to.is_empty() && !self.disabled {
            return Err(self.error("启用的任务必须提供非空的 'to' 列表"));
        }
        if to.iter().any(|entry| entry.trim().is_empty()) {
            return Err(self.error("'to' 列表中不能有空项"));
        }
        Ok(())
    }

    /// 收件人选择器列表，缺省为空
    pub fn to(&self) -> Result<Vec<String>> {
        match self.options.get(OPTION_TO) {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| self.error(format!("选项 'to' 必须是字符串列表: {e}"))),
        }
    }

    /// 日志查询条件，缺省为默认查询
    pub fn log_query(&self) -> Result<LogQuery> {
        match self.options.get(OPTION_QUERY) {
            None => Ok(LogQuery::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| self.error(format!("选项 'query' 格式错误: {e}"))),
        }
    }

    /// 没有日志时是否仍然发送邮件，缺省为 false
    pub fn send_empty(&self) -> Result<bool> {
        match self.options.get(OPTION_SEND_EMPTY) {
            None => Ok(false),
            Some(serde_json::Value::Bool(value)) => Ok(*value),
            Some(other) => Err(self.error(format!("选项 'send-empty' 必须是布尔值，实际为 {other}"))),
        }
    }

    /// 内容哈希：规范 JSON 编码的 SHA-256（十六进制小写）
    ///
    /// 选项使用有序映射，相同的任务定义总是得到相同的编码。
    pub fn hash(&self) -> Result<String> {
        let encoded = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }

    fn error(&self, msg: impl std::fmt::Display) -> AutograderError {
        AutograderError::validation(format!("任务 '{}' ({}): {msg}", self.name, self.task_type))
    }
}

/// 系统维护的任务状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SystemTaskInfo {
    pub source: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_run_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub next_run_time: DateTime<Utc>,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

impl SystemTaskInfo {
    /// 继承已持久化任务的运行时间
    ///
    /// 上次运行时间总是沿用旧值；下次运行时间取两者中较早者。
    pub fn merge_times(&mut self, old: &SystemTaskInfo) {
        self.last_run_time = old.last_run_time;
        self.next_run_time = self.next_run_time.min(old.next_run_time);
    }
}

/// 持久化的完整任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FullScheduledTask {
    pub user_info: UserTaskInfo,
    pub system_info: SystemTaskInfo,
}

impl FullScheduledTask {
    /// 将课程中的任务定义转换为完整任务
    ///
    /// 调度时间缺失或无效时下次运行时间设为最大值，之后的 `validate` 会拒绝它。
    pub fn from_course_task(
        user_info: &UserTaskInfo,
        course_id: &str,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let next_run_time = user_info
            .when
            .as_ref()
            .and_then(|when| when.next_time(now).ok())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Self {
            user_info: user_info.clone(),
            system_info: SystemTaskInfo {
                source: source.to_string(),
                last_run_time: DateTime::<Utc>::UNIX_EPOCH,
                next_run_time,
                hash: user_info.hash()?,
                course_id: Some(course_id.to_string()),
                assignment_id: None,
                user_email: None,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.user_info.validate()?;

        match &self.user_info.when {
            Some(when) => when.validate()?,
            None => {
                return Err(AutograderError::validation(format!(
                    "任务 '{}' ({}) 缺少调度时间 'when'",
                    self.user_info.name, self.user_info.task_type
                )));
            }
        }

        if self.system_info.hash != self.user_info.hash()? {
            return Err(AutograderError::validation(format!(
                "任务 '{}' 的内容哈希与定义不一致",
                self.user_info.name
            )));
        }

        if self.system_info.course_id.as_deref().is_none_or(str::is_empty) {
            return Err(AutograderError::validation(format!(
                "任务 '{}' 未关联课程",
                self.user_info.name
            )));
        }

        Ok(())
    }

    pub fn task_type(&self) -> TaskType {
        self.user_info.task_type
    }

    pub fn course_id(&self) -> &str {
        self.system_info.course_id.as_deref().unwrap_or_default()
    }

    pub fn hash(&self) -> &str {
        &self.system_info.hash
    }

    pub fn is_active(&self) -> bool {
        !self.user_info.disabled
    }

    /// 同一课程中的同一任务定义
    pub fn same_task(&self, other: &FullScheduledTask) -> bool {
        self.course_id() == other.course_id() && self.hash() == other.hash()
    }

    /// 记录一次运行，并计算下一次运行时间
    pub fn mark_ran(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.system_info.last_run_time = now;

        let when = self.user_info.when.as_ref().ok_or_else(|| {
            AutograderError::validation(format!("任务 '{}' 缺少调度时间", self.user_info.name))
        })?;
        self.system_info.next_run_time = when.next_time(now)?;
        Ok(())
    }
}
