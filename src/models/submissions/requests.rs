use serde::Deserialize;

/// 查询单次提交
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchAttemptQuery {
    #[serde(default)]
    pub target_email: String,
    #[serde(default)]
    pub target_submission: String,
}

/// 按目标用户查询
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetUserQuery {
    #[serde(default)]
    pub target_email: String,
}

/// 查询最近成绩
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchScoresRequest {
    #[serde(default = "default_target_users")]
    pub target_users: Vec<String>,
}

fn default_target_users() -> Vec<String> {
    vec!["*".to_string()]
}

/// 删除提交
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoveSubmissionRequest {
    #[serde(default)]
    pub target_email: String,
    #[serde(default)]
    pub target_submission: String,
}
