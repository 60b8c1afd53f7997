//! 代码分析记录
//!
//! 单份提交的分析以完整提交 ID 为键，成对分析以 [`PairwiseKey`] 为键。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{AutograderError, Result};
use crate::models::common::FullSubmissionId;

pub const PAIRWISE_KEY_DELIM: &str = "||";

/// 两份提交组成的无序对，内部按字典序排列
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "[String; 2]", into = "[String; 2]")]
pub struct PairwiseKey([String; 2]);

impl PairwiseKey {
    pub fn new(a: &str, b: &str) -> Result<Self> {
        let first = FullSubmissionId::parse(a)?;
        let second = FullSubmissionId::parse(b)?;

        if first.course_id != second.course_id {
            return Err(AutograderError::validation(format!(
                "成对分析的两份提交必须属于同一课程: '{a}', '{b}'"
            )));
        }

        let (a, b) = (first.to_string(), second.to_string());
        if a <= b {
            Ok(Self([a, b]))
        } else {
            Ok(Self([b, a]))
        }
    }

    /// 解析 `a||b` 形式的键
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((a, b)) = raw.split_once(PAIRWISE_KEY_DELIM) else {
            return Err(AutograderError::validation(format!(
                "无法解析成对分析键: '{raw}'"
            )));
        };
        Self::new(a, b)
    }

    pub fn first(&self) -> &str {
        &self.0[0]
    }

    pub fn second(&self) -> &str {
        &self.0[1]
    }

    /// 两份提交共同所属的课程
    pub fn course(&self) -> String {
        self.first()
            .split(crate::models::common::ids::ID_DELIM)
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

impl TryFrom<[String; 2]> for PairwiseKey {
    type Error = AutograderError;

    fn try_from(value: [String; 2]) -> Result<Self> {
        Self::new(&value[0], &value[1])
    }
}

impl From<PairwiseKey> for [String; 2] {
    fn from(key: PairwiseKey) -> Self {
        key.0
    }
}

impl fmt::Display for PairwiseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PAIRWISE_KEY_DELIM}{}", self.first(), self.second())
    }
}

// 单个文件的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileStats {
    pub filename: String,
    pub lines: u64,
}

/// 单份提交的分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndividualAnalysis {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub analysis_timestamp: DateTime<Utc>,
    pub full_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub submission_start_time: DateTime<Utc>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub files: Vec<FileStats>,
    #[serde(default)]
    pub lines_of_code: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
}

// 某个工具对一对文件给出的相似度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileSimilarity {
    pub filename: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub score: f64,
}

/// 两份提交的成对分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PairwiseAnalysis {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub analysis_timestamp: DateTime<Utc>,
    pub submission_ids: PairwiseKey,
    /// 文件名 -> 各工具的相似度
    #[serde(default)]
    pub similarities: BTreeMap<String, Vec<FileSimilarity>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched_files: Vec<[String; 2]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<String>,
}

impl PairwiseAnalysis {
    /// 每个工具在所有文件上的平均相似度
    pub fn mean_similarities(&self) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for similarity in self.similarities.values().flatten() {
            let entry = totals.entry(similarity.tool.clone()).or_default();
            entry.0 += similarity.score;
            entry.1 += 1;
        }

        totals
            .into_iter()
            .map(|(tool, (sum, count))| (tool, sum / count as f64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "course101::hw0::alice@test.com::1";
    const B: &str = "course101::hw0::bob@test.com::2";

    #[test]
    fn test_pairwise_key_is_unordered() {
        let ab = PairwiseKey::new(A, B).unwrap();
        let ba = PairwiseKey::new(B, A).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.first(), A);
        assert_eq!(ab.course(), "course101");
    }

    #[test]
    fn test_pairwise_key_rejects_mixed_courses() {
        assert!(PairwiseKey::new(A, "course102::hw0::bob@test.com::2").is_err());
        assert!(PairwiseKey::new(A, "not-an-id").is_err());
    }

    #[test]
    fn test_pairwise_key_serde() {
        let key = PairwiseKey::new(B, A).unwrap();
        let text = serde_json::to_string(&key).unwrap();
        assert_eq!(text, format!("[\"{A}\",\"{B}\"]"));

        let back: PairwiseKey = serde_json::from_str(&format!("[\"{B}\",\"{A}\"]")).unwrap();
        assert_eq!(back, key);

        assert!(serde_json::from_str::<PairwiseKey>("[\"x\",\"y\"]").is_err());
    }

    #[test]
    fn test_parse_display() {
        let key = PairwiseKey::new(A, B).unwrap();
        assert_eq!(PairwiseKey::parse(&key.to_string()).unwrap(), key);
        assert!(PairwiseKey::parse(A).is_err());
    }

    #[test]
    fn test_mean_similarities() {
        let mut analysis = PairwiseAnalysis {
            analysis_timestamp: Utc::now(),
            submission_ids: PairwiseKey::new(A, B).unwrap(),
            similarities: BTreeMap::new(),
            unmatched_files: Vec::new(),
            skipped_files: Vec::new(),
        };
        for (file, score) in [("a.py", 0.2), ("b.py", 0.4)] {
            analysis.similarities.insert(
                file.to_string(),
                vec![FileSimilarity {
                    filename: file.to_string(),
                    tool: "dolos".to_string(),
                    version: String::new(),
                    score,
                }],
            );
        }

        let means = analysis.mean_similarities();
        assert!((means["dolos"] - 0.3).abs() < 1e-9);
    }
}
