use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{
    FileStorage, INPUT_DIRNAME, OUTPUT_DIRNAME, STDERR_FILENAME, STDOUT_FILENAME,
    SUBMISSION_RESULT_FILENAME,
};
use crate::errors::{AutograderError, Result};
use crate::models::{
    common::{FullSubmissionId, compare_short_ids},
    courses::entities::Assignment,
    references::ParsedCourseUserReference,
    submissions::entities::{GradingInfo, GradingResult, ScoringInfo, SubmissionHistoryItem},
};
use crate::utils::{
    archive::{pack_dir, unpack_to_dir},
    normalize_email, read_json_file, write_json_file,
};

/// 列出用户目录下的短 ID，按时间先后（长度、字典序）排序
fn list_short_ids(user_dir: &Path) -> Result<Vec<String>> {
    if !user_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut short_ids = Vec::new();
    for entry in fs::read_dir(user_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            short_ids.push(entry.file_name().to_string_lossy().to_string());
        }
    }

    short_ids.sort_by(|a, b| compare_short_ids(a, b));
    Ok(short_ids)
}

/// 短 ID 为空时取最近一次
fn resolve_short_id(user_dir: &Path, short_id: &str) -> Result<Option<String>> {
    let short_id = short_id.trim();
    if !short_id.is_empty() {
        return Ok(Some(short_id.to_string()));
    }
    Ok(list_short_ids(user_dir)?.pop())
}

fn read_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path)
        .map_err(|e| AutograderError::storage(format!("读取文件 '{}' 失败: {e}", path.display())))
}

fn load_grading_info(submission_dir: &Path) -> Result<Option<GradingInfo>> {
    read_json_file(&submission_dir.join(SUBMISSION_RESULT_FILENAME))
}

fn load_grading_result(submission_dir: &Path) -> Result<Option<GradingResult>> {
    let Some(info) = load_grading_info(submission_dir)? else {
        return Ok(None);
    };

    Ok(Some(GradingResult {
        info,
        input_files_gzip: pack_dir(&submission_dir.join(INPUT_DIRNAME))?,
        output_files_gzip: pack_dir(&submission_dir.join(OUTPUT_DIRNAME))?,
        stdout: read_text(&submission_dir.join(STDOUT_FILENAME))?,
        stderr: read_text(&submission_dir.join(STDERR_FILENAME))?,
    }))
}

fn write_grading_result(submission_dir: &Path, result: &GradingResult) -> Result<()> {
    fs::create_dir_all(submission_dir).map_err(|e| {
        AutograderError::storage(format!(
            "创建提交目录 '{}' 失败: {e}",
            submission_dir.display()
        ))
    })?;

    write_json_file(&submission_dir.join(SUBMISSION_RESULT_FILENAME), &result.info)?;
    unpack_to_dir(&result.input_files_gzip, &submission_dir.join(INPUT_DIRNAME))?;
    unpack_to_dir(&result.output_files_gzip, &submission_dir.join(OUTPUT_DIRNAME))?;

    for (name, text) in [
        (STDOUT_FILENAME, &result.stdout),
        (STDERR_FILENAME, &result.stderr),
    ] {
        let path = submission_dir.join(name);
        fs::write(&path, text).map_err(|e| {
            AutograderError::storage(format!("写入文件 '{}' 失败: {e}", path.display()))
        })?;
    }

    Ok(())
}

impl FileStorage {
    fn assignment_user_dir(&self, assignment: &Assignment, email: &str) -> PathBuf {
        self.user_submissions_dir(&assignment.course_id, &assignment.id, &normalize_email(email))
    }

    /// 分配下一个短 ID
    ///
    /// 以当前秒数为起点，且大于目录下所有已有短 ID；路径已存在时继续递增。
    pub async fn get_next_submission_id_impl(
        &self,
        assignment: &Assignment,
        email: &str,
    ) -> Result<String> {
        let lock_path = self.course_submissions_dir(&assignment.course_id);
        let _guard = self.path_locks.read(&lock_path).await;

        let user_dir = self.assignment_user_dir(assignment, email);
        let max_existing = list_short_ids(&user_dir)?
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .max();

        let now = Utc::now().timestamp().max(0) as u64;
        let mut next = match max_existing {
            Some(max) => now.max(max + 1),
            None => now,
        };

        while user_dir.join(next.to_string()).exists() {
            next += 1;
        }

        Ok(next.to_string())
    }

    /// 批量保存评分结果
    ///
    /// 按输入顺序逐个写入；单个结果失败不会中断后续写入，所有错误合并后返回。
    pub async fn save_submissions_impl(
        &self,
        course_id: &str,
        results: Vec<GradingResult>,
    ) -> Result<()> {
        let lock_path = self.course_submissions_dir(course_id);
        let _guard = self.path_locks.write(&lock_path).await;

        let mut errors = Vec::new();
        for result in &results {
            let info = &result.info;
            if let Err(e) = info.validate_for_course(course_id) {
                errors.push(e);
                continue;
            }

            let submission_dir = self
                .user_submissions_dir(course_id, &info.assignment_id, &normalize_email(&info.user))
                .join(&info.short_id);

            match write_grading_result(&submission_dir, result) {
                Ok(()) => debug!("已保存提交 {}", info.id),
                Err(e) => {
                    warn!("保存提交 {} 失败: {}", info.id, e);
                    errors.push(e.context(format!("提交 '{}'", info.id)));
                }
            }
        }

        match AutograderError::join(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 获取单次提交；用户或提交不存在时返回 None
    pub async fn get_submission_contents_impl(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<Option<GradingResult>> {
        let lock_path = self.course_submissions_dir(&assignment.course_id);
        let _guard = self.path_locks.read(&lock_path).await;

        let user_dir = self.assignment_user_dir(assignment, email);
        let Some(short_id) = resolve_short_id(&user_dir, short_id)? else {
            return Ok(None);
        };

        load_grading_result(&user_dir.join(short_id))
    }

    fn load_all_infos(&self, user_dir: &Path) -> Result<Vec<(String, GradingInfo)>> {
        let mut infos = Vec::new();
        for short_id in list_short_ids(user_dir)? {
            match load_grading_info(&user_dir.join(&short_id))? {
                Some(info) => infos.push((short_id, info)),
                None => warn!(
                    "提交目录 '{}' 缺少 {}",
                    user_dir.join(&short_id).display(),
                    SUBMISSION_RESULT_FILENAME
                ),
            }
        }

        infos.sort_by_key(|(_, info)| info.grading_start_time);
        Ok(infos)
    }

    /// 获取全部提交，按评分开始时间升序
    pub async fn get_submission_attempts_impl(
        &self,
        assignment: &Assignment,
        email: &str,
    ) -> Result<Vec<GradingResult>> {
        let lock_path = self.course_submissions_dir(&assignment.course_id);
        let _guard = self.path_locks.read(&lock_path).await;

        let user_dir = self.assignment_user_dir(assignment, email);
        let mut results = Vec::new();
        for (short_id, _) in self.load_all_infos(&user_dir)? {
            if let Some(result) = load_grading_result(&user_dir.join(short_id))? {
                results.push(result);
            }
        }

        Ok(results)
    }

    /// 获取提交历史，按评分开始时间升序
    pub async fn get_submission_history_impl(
        &self,
        assignment: &Assignment,
        email: &str,
    ) -> Result<Vec<SubmissionHistoryItem>> {
        let lock_path = self.course_submissions_dir(&assignment.course_id);
        let _guard = self.path_locks.read(&lock_path).await;

        let user_dir = self.assignment_user_dir(assignment, email);
        Ok(self
            .load_all_infos(&user_dir)?
            .iter()
            .map(|(_, info)| SubmissionHistoryItem::from(info))
            .collect())
    }

    /// 引用所指的每个课程成员的最近一次提交信息
    ///
    /// 没有提交的用户映射为 None。
    async fn get_recent_infos(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<GradingInfo>>> {
        let users = self.get_course_users_impl(&assignment.course_id).await?;

        let lock_path = self.course_submissions_dir(&assignment.course_id);
        let _guard = self.path_locks.read(&lock_path).await;

        let mut infos = BTreeMap::new();
        for user in reference.resolve_course_users(&users) {
            let user_dir = self.assignment_user_dir(assignment, &user.email);
            let info = match list_short_ids(&user_dir)?.pop() {
                Some(short_id) => load_grading_info(&user_dir.join(short_id))?,
                None => None,
            };
            infos.insert(user.email, info);
        }

        Ok(infos)
    }

    /// 引用所指用户的最近一次完整提交
    pub async fn get_recent_submissions_impl(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<GradingResult>>> {
        let infos = self.get_recent_infos(assignment, reference).await?;

        let lock_path = self.course_submissions_dir(&assignment.course_id);
        let _guard = self.path_locks.read(&lock_path).await;

        let mut results = BTreeMap::new();
        for (email, info) in infos {
            let result = match info {
                Some(info) => {
                    let dir = self
                        .assignment_user_dir(assignment, &email)
                        .join(&info.short_id);
                    load_grading_result(&dir)?
                }
                None => None,
            };
            results.insert(email, result);
        }

        Ok(results)
    }

    pub async fn get_recent_submission_survey_impl(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<SubmissionHistoryItem>>> {
        Ok(self
            .get_recent_infos(assignment, reference)
            .await?
            .into_iter()
            .map(|(email, info)| (email, info.as_ref().map(SubmissionHistoryItem::from)))
            .collect())
    }

    pub async fn get_scoring_infos_impl(
        &self,
        assignment: &Assignment,
        reference: &ParsedCourseUserReference,
    ) -> Result<BTreeMap<String, Option<ScoringInfo>>> {
        Ok(self
            .get_recent_infos(assignment, reference)
            .await?
            .into_iter()
            .map(|(email, info)| (email, info.as_ref().map(ScoringInfo::from)))
            .collect())
    }

    /// 给定短 ID 之前紧邻的一次提交的完整 ID，没有时返回空串
    pub async fn get_previous_submission_id_impl(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<String> {
        let lock_path = self.course_submissions_dir(&assignment.course_id);
        let _guard = self.path_locks.read(&lock_path).await;

        let email = normalize_email(email);
        let user_dir = self.assignment_user_dir(assignment, &email);
        let short_id = short_id.trim();

        let previous = list_short_ids(&user_dir)?
            .into_iter()
            .rfind(|id| compare_short_ids(id, short_id).is_lt());

        Ok(previous
            .map(|id| {
                FullSubmissionId::new(&assignment.course_id, &assignment.id, &email, &id)
                    .to_string()
            })
            .unwrap_or_default())
    }

    /// 删除提交目录；短 ID 为空时删除最近一次
    pub async fn remove_submission_impl(
        &self,
        assignment: &Assignment,
        email: &str,
        short_id: &str,
    ) -> Result<bool> {
        let lock_path = self.course_submissions_dir(&assignment.course_id);
        let _guard = self.path_locks.write(&lock_path).await;

        let user_dir = self.assignment_user_dir(assignment, email);
        let Some(short_id) = resolve_short_id(&user_dir, short_id)? else {
            return Ok(false);
        };

        let submission_dir = user_dir.join(&short_id);
        if !submission_dir.is_dir() {
            return Ok(false);
        }

        fs::remove_dir_all(&submission_dir).map_err(|e| {
            AutograderError::storage(format!(
                "删除提交目录 '{}' 失败: {e}",
                submission_dir.display()
            ))
        })?;

        debug!("已删除提交 {}", submission_dir.display());
        Ok(true)
    }
}
