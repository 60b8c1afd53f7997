//! 代码分析记录：每门课程两个只追加的 JSONL 日志
//!
//! 读取时扫描整个日志，同一个键以最后出现的记录为准；
//! 删除时只去掉命中的记录，无法解析的行原样保留。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{FileStorage, INDIVIDUAL_ANALYSIS_FILENAME, PAIRWISE_ANALYSIS_FILENAME};
use crate::errors::Result;
use crate::models::{
    analysis::entities::{IndividualAnalysis, PairwiseAnalysis, PairwiseKey},
    common::FullSubmissionId,
};
use crate::utils::json::{append_jsonl, read_jsonl, retain_jsonl};

/// 将完整 ID 按课程分组；无法解析的 ID 记录警告后跳过
fn group_full_ids(full_ids: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for raw in full_ids {
        match FullSubmissionId::parse(raw) {
            Ok(id) => groups.entry(id.course_id.clone()).or_default().push(id.to_string()),
            Err(e) => warn!("跳过无法解析的提交 ID '{}': {}", raw, e),
        }
    }

    for ids in groups.values_mut() {
        ids.sort();
        ids.dedup();
    }
    groups
}

fn group_pairwise_keys(keys: &[PairwiseKey]) -> BTreeMap<String, Vec<PairwiseKey>> {
    let mut groups: BTreeMap<String, Vec<PairwiseKey>> = BTreeMap::new();
    for key in keys {
        groups.entry(key.course()).or_default().push(key.clone());
    }

    for keys in groups.values_mut() {
        keys.sort();
        keys.dedup();
    }
    groups
}

fn log_bad_line(path: &Path) -> impl FnMut(usize, &str, serde_json::Error) + '_ {
    move |line, _, e| warn!("跳过 '{}' 第 {} 行无法解析的分析记录: {}", path.display(), line, e)
}

impl FileStorage {
    fn individual_log_path(&self, course_id: &str) -> PathBuf {
        self.course_dir(course_id).join(INDIVIDUAL_ANALYSIS_FILENAME)
    }

    fn pairwise_log_path(&self, course_id: &str) -> PathBuf {
        self.course_dir(course_id).join(PAIRWISE_ANALYSIS_FILENAME)
    }

    /// 追加单份提交的分析记录，提交 ID 先规范化
    pub async fn store_individual_analysis_impl(
        &self,
        records: Vec<IndividualAnalysis>,
    ) -> Result<()> {
        let mut by_course: BTreeMap<String, Vec<IndividualAnalysis>> = BTreeMap::new();
        for mut record in records {
            match FullSubmissionId::parse(&record.full_id) {
                Ok(id) => {
                    record.full_id = id.to_string();
                    by_course.entry(id.course_id).or_default().push(record);
                }
                Err(e) => warn!("跳过提交 ID 无法解析的分析记录 '{}': {}", record.full_id, e),
            }
        }

        for (course_id, records) in by_course {
            let path = self.individual_log_path(&course_id);
            let _guard = self.path_locks.write(&path).await;
            append_jsonl(&path, &records)?;
        }

        Ok(())
    }

    /// 按完整提交 ID 查询分析记录
    pub async fn get_individual_analysis_impl(
        &self,
        full_ids: &[String],
    ) -> Result<BTreeMap<String, IndividualAnalysis>> {
        let mut found = BTreeMap::new();

        for (course_id, ids) in group_full_ids(full_ids) {
            let path = self.individual_log_path(&course_id);
            let _guard = self.path_locks.read(&path).await;

            let records: Vec<IndividualAnalysis> = read_jsonl(&path, log_bad_line(&path))?;
            for record in records {
                if ids.binary_search(&record.full_id).is_ok() {
                    found.insert(record.full_id.clone(), record);
                }
            }
        }

        Ok(found)
    }

    /// 删除给定提交的所有分析记录
    pub async fn remove_individual_analysis_impl(&self, full_ids: &[String]) -> Result<()> {
        for (course_id, ids) in group_full_ids(full_ids) {
            let path = self.individual_log_path(&course_id);
            let _guard = self.path_locks.write(&path).await;

            if !path.exists() {
                continue;
            }

            retain_jsonl(
                &path,
                |record: &IndividualAnalysis| ids.binary_search(&record.full_id).is_err(),
                log_bad_line(&path),
            )?;
        }

        Ok(())
    }

    /// 追加成对分析记录
    pub async fn store_pairwise_analysis_impl(&self, records: Vec<PairwiseAnalysis>) -> Result<()> {
        let mut by_course: BTreeMap<String, Vec<PairwiseAnalysis>> = BTreeMap::new();
        for record in records {
            by_course
                .entry(record.submission_ids.course())
                .or_default()
                .push(record);
        }

        for (course_id, records) in by_course {
            let path = self.pairwise_log_path(&course_id);
            let _guard = self.path_locks.write(&path).await;
            append_jsonl(&path, &records)?;
        }

        Ok(())
    }

    /// 按成对键查询分析记录
    pub async fn get_pairwise_analysis_impl(
        &self,
        keys: &[PairwiseKey],
    ) -> Result<BTreeMap<PairwiseKey, PairwiseAnalysis>> {
        let mut found = BTreeMap::new();

        for (course_id, keys) in group_pairwise_keys(keys) {
            let path = self.pairwise_log_path(&course_id);
            let _guard = self.path_locks.read(&path).await;

            let records: Vec<PairwiseAnalysis> = read_jsonl(&path, log_bad_line(&path))?;
            for record in records {
                if keys.binary_search(&record.submission_ids).is_ok() {
                    found.insert(record.submission_ids.clone(), record);
                }
            }
        }

        Ok(found)
    }

    /// 删除给定成对键的所有分析记录
    pub async fn remove_pairwise_analysis_impl(&self, keys: &[PairwiseKey]) -> Result<()> {
        for (course_id, keys) in group_pairwise_keys(keys) {
            let path = self.pairwise_log_path(&course_id);
            let _guard = self.path_locks.write(&path).await;

            if !path.exists() {
                continue;
            }

            retain_jsonl(
                &path,
                |record: &PairwiseAnalysis| keys.binary_search(&record.submission_ids).is_err(),
                log_bad_line(&path),
            )?;
        }

        Ok(())
    }
}
