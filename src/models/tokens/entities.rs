use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::errors::{AutograderError, Result};
use crate::utils::password::{digests_match, hash_token};
use crate::utils::validate::is_lower_hex;

// 令牌来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Unknown,
    Password, // 用户设置的密码
    Server,   // 服务端生成
    Email,    // 通过邮件下发
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenSource::Unknown => "unknown",
            TokenSource::Password => "password",
            TokenSource::Server => "server",
            TokenSource::Email => "email",
        };
        write!(f, "{text}")
    }
}

/// 认证令牌，只保存摘要，不保存明文
///
/// 相等与排序只看 `(source, name, digest)`，令牌 ID 与时间戳不参与。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Token {
    pub id: String,
    pub digest: String,
    pub source: TokenSource,
    #[serde(default)]
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub creation_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub access_time: DateTime<Utc>,
}

impl Token {
    /// 由明文和用户盐创建新令牌
    pub fn new(cleartext: &str, salt: &str, source: TokenSource, name: &str) -> Result<Self> {
        if cleartext.is_empty() {
            return Err(AutograderError::validation("令牌明文不能为空"));
        }

        Ok(Self::from_digest(hash_token(cleartext, salt)?, source, name))
    }

    /// 由已算好的摘要创建新令牌
    pub fn from_digest(digest: String, source: TokenSource, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            digest,
            source,
            name: name.to_string(),
            creation_time: now,
            access_time: now,
        }
    }

    /// 与输入摘要做常数时间比较
    pub fn matches(&self, digest: &str) -> bool {
        digests_match(&self.digest, digest)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_lower_hex(&self.digest) {
            return Err(AutograderError::validation(format!(
                "令牌 '{}' 的摘要必须是非空的小写十六进制串",
                self.id
            )));
        }
        Ok(())
    }

    fn sort_key(&self) -> (TokenSource, &str, &str) {
        (self.source, self.name.as_str(), self.digest.as_str())
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Token {}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
