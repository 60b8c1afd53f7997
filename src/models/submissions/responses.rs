use serde::Serialize;
use std::collections::BTreeMap;

use super::entities::{GradingResult, SubmissionHistoryItem};

/// 单次提交响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchAttemptResponse {
    pub found_user: bool,
    pub found_submission: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grading_result: Option<GradingResult>,
}

/// 全部提交响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchAttemptsResponse {
    pub found_user: bool,
    pub grading_results: Vec<GradingResult>,
}

/// 提交历史响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchHistoryResponse {
    pub found_user: bool,
    pub history: Vec<SubmissionHistoryItem>,
}

/// 最近成绩响应：用户没有提交时对应 null
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchScoresResponse {
    pub submission_infos: BTreeMap<String, Option<SubmissionHistoryItem>>,
}

/// 删除提交响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoveSubmissionResponse {
    pub found_user: bool,
    pub found_submission: bool,
}
