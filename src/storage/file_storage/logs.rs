use chrono::Utc;
use tracing::warn;

use super::FileStorage;
use crate::errors::Result;
use crate::models::logs::entities::{LogQuery, LogRecord};
use crate::utils::json::{append_jsonl, read_jsonl};

impl FileStorage {
    /// 追加应用日志
    pub async fn append_logs_impl(&self, records: Vec<LogRecord>) -> Result<()> {
        let _guard = self.logs_lock.write().await;
        append_jsonl(&self.log_path(), &records)
    }

    /// 按条件查询应用日志，保持写入顺序
    pub async fn query_logs_impl(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        let start = query.start_time(Utc::now())?;

        let _guard = self.logs_lock.read().await;
        let path = self.log_path();
        let records: Vec<LogRecord> = read_jsonl(&path, |line, _, e| {
            warn!("跳过 '{}' 第 {} 行无法解析的日志: {}", path.display(), line, e)
        })?;

        Ok(records
            .into_iter()
            .filter(|record| query.matches(record, start))
            .collect())
    }
}
