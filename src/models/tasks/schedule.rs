//! 任务调度时间
//!
//! - `{"daily": "HH:MM[:SS[.fraction]]"}`：每天在本地时区的固定时刻运行；
//! - `{"every": {"days": N, ...}}`：以固定间隔运行。

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AutograderError, Result};

const NANOS_PER_MILLI: i128 = 1_000_000;
const NANOS_PER_SECOND: i128 = 1_000 * NANOS_PER_MILLI;
const NANOS_PER_MINUTE: i128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i128 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i128 = 24 * NANOS_PER_HOUR;

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// 固定间隔
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSpec {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub days: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub hours: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub minutes: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub seconds: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub milliseconds: u64,
}

impl DurationSpec {
    pub fn total_nanos(&self) -> i128 {
        self.days as i128 * NANOS_PER_DAY
            + self.hours as i128 * NANOS_PER_HOUR
            + self.minutes as i128 * NANOS_PER_MINUTE
            + self.seconds as i128 * NANOS_PER_SECOND
            + self.milliseconds as i128 * NANOS_PER_MILLI
    }

    pub fn to_duration(&self) -> Result<Duration> {
        let total = self.total_nanos();
        if total <= 0 {
            return Err(AutograderError::validation("间隔时长必须大于 0"));
        }

        let nanos = i64::try_from(total)
            .map_err(|_| AutograderError::validation("间隔时长超出可表示范围"))?;
        Ok(Duration::nanoseconds(nanos))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleSpec {
    Daily(String),
    Every(DurationSpec),
}

impl ScheduleSpec {
    pub fn validate(&self) -> Result<()> {
        match self {
            ScheduleSpec::Daily(text) => parse_daily_time(text).map(|_| ()),
            ScheduleSpec::Every(spec) => spec.to_duration().map(|_| ()),
        }
    }

    /// 计算 `from` 之后的下一次运行时间
    pub fn next_time(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match self {
            ScheduleSpec::Daily(text) => {
                let time = parse_daily_time(text)?;
                next_daily(time, from)
            }
            ScheduleSpec::Every(spec) => {
                let step = spec.to_duration()?;
                from.checked_add_signed(step)
                    .ok_or_else(|| AutograderError::validation("下一次运行时间超出可表示范围"))
            }
        }
    }
}

/// 解析 `HH:MM[:SS[.fraction]]`
pub fn parse_daily_time(text: &str) -> Result<NaiveTime> {
    let invalid = || AutograderError::validation(format!("无效的每日时间: '{text}'"));

    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(invalid());
    }

    let hours: u32 = parse_number(parts[0]).ok_or_else(invalid)?;
    let minutes: u32 = parse_number(parts[1]).ok_or_else(invalid)?;

    let (seconds, nanos) = match parts.get(2) {
        None => (0, 0),
        Some(raw) => {
            let (whole, fraction) = match raw.split_once('.') {
                Some((whole, fraction)) => (whole, Some(fraction)),
                None => (*raw, None),
            };

            let seconds: u32 = parse_number(whole).ok_or_else(invalid)?;
            let nanos = match fraction {
                None => 0,
                Some(fraction) => parse_fraction_nanos(fraction).ok_or_else(invalid)?,
            };
            (seconds, nanos)
        }
    };

    if hours >= 24 || minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    NaiveTime::from_hms_nano_opt(hours, minutes, seconds, nanos).ok_or_else(invalid)
}

fn parse_number(text: &str) -> Option<u32> {
    if text.is_empty() || text.len() > 2 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_fraction_nanos(fraction: &str) -> Option<u32> {
    if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    // 超过纳秒精度的位数直接截断
    let digits: String = fraction.chars().take(9).collect();
    let padded = format!("{digits:0<9}");
    padded.parse().ok()
}

fn next_daily(time: NaiveTime, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let local_from = from.with_timezone(&Local);
    let mut date = local_from.date_naive();

    // 最多向后看两天，跨过夏令时造成的不存在时刻
    for _ in 0..3 {
        if let Some(candidate) = Local.from_local_datetime(&date.and_time(time)).earliest() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > from {
                return Ok(candidate);
            }
        }

        date = date
            .succ_opt()
            .ok_or_else(|| AutograderError::validation("下一次运行时间超出可表示范围"))?;
    }

    Err(AutograderError::validation(format!(
        "无法计算每日时间 {time} 的下一次运行时间"
    )))
}
