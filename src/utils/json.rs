//! JSON / JSONL 文件读写
//!
//! 整文件 JSON 使用四空格缩进；JSONL 每行一个紧凑对象。

use serde::{Serialize, de::DeserializeOwned};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::errors::{AutograderError, Result};

/// 序列化为四空格缩进的 JSON 字符串
pub fn to_pretty_string<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| AutograderError::serialization(e.to_string()))
}

/// 读取 JSON 文件，文件不存在时返回 None
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let text = fs::read_to_string(path)
        .map_err(|e| AutograderError::storage(format!("读取文件 '{}' 失败: {e}", path.display())))?;
    let value = serde_json::from_str(&text).map_err(|e| {
        AutograderError::serialization(format!("解析文件 '{}' 失败: {e}", path.display()))
    })?;
    Ok(Some(value))
}

/// 写入 JSON 文件（整文件覆盖），必要时创建父目录
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AutograderError::storage(format!("创建目录 '{}' 失败: {e}", parent.display()))
        })?;
    }

    let mut text = to_pretty_string(value)?;
    text.push('\n');
    fs::write(path, text)
        .map_err(|e| AutograderError::storage(format!("写入文件 '{}' 失败: {e}", path.display())))
}

/// 追加记录到 JSONL 文件
pub fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AutograderError::storage(format!("打开文件 '{}' 失败: {e}", path.display())))?;
    file.write_all(out.as_bytes())?;
    Ok(())
}

/// 逐行读取 JSONL 文件；文件不存在视为空
///
/// 无法解析的行交给 `on_bad_line` 处理后跳过，不会中断整个读取。
pub fn read_jsonl<T, F>(path: &Path, mut on_bad_line: F) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    F: FnMut(usize, &str, serde_json::Error),
{
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(path)
        .map_err(|e| AutograderError::storage(format!("打开文件 '{}' 失败: {e}", path.display())))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => on_bad_line(index + 1, &line, e),
        }
    }

    Ok(records)
}

/// 过滤 JSONL 文件，只删除能解析且 `keep` 返回 false 的行，返回删除的行数
///
/// 保留的行按原文写回；无法解析的行交给 `on_bad_line` 后原样保留。
pub fn retain_jsonl<T, K, F>(path: &Path, mut keep: K, mut on_bad_line: F) -> Result<usize>
where
    T: DeserializeOwned,
    K: FnMut(&T) -> bool,
    F: FnMut(usize, &str, serde_json::Error),
{
    if !path.exists() {
        return Ok(0);
    }

    let file = fs::File::open(path)
        .map_err(|e| AutograderError::storage(format!("打开文件 '{}' 失败: {e}", path.display())))?;

    let mut out = String::new();
    let mut removed = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(&line) {
            Ok(record) if !keep(&record) => {
                removed += 1;
                continue;
            }
            Ok(_) => {}
            Err(e) => on_bad_line(index + 1, &line, e),
        }
        out.push_str(&line);
        out.push('\n');
    }

    // 先写临时文件再替换
    if removed > 0 {
        let tmp_path = path.with_extension("jsonl.tmp");
        fs::write(&tmp_path, out)?;
        fs::rename(&tmp_path, path)?;
    }
    Ok(removed)
}
