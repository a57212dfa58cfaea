//! Epoch normalization and date bucketing.
//!
//! Conversations arrive with creation epochs in either seconds or
//! milliseconds. They are normalized to milliseconds on construction and
//! grouped into day buckets whose display key (`5 Mar 2024`) can be parsed
//! back into the bucket's midnight epoch.

use chrono::{FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    BUCKET_DATE_FORMAT, BUCKET_PARSE_FORMAT, EPOCH_MILLIS_THRESHOLD, TIME_OF_DAY_FORMAT,
};

/// Normalize a raw creation epoch to milliseconds.
pub fn normalize_epoch_ms(raw: i64) -> i64 {
    if raw.abs() < EPOCH_MILLIS_THRESHOLD {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Maps timestamps onto day buckets in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBucketer {
    offset_minutes: i32,
}

impl DateBucketer {
    /// Offsets outside +/-24h fall back to UTC.
    pub fn new(offset_minutes: i32) -> Self {
        let offset_minutes = if offset_minutes.abs() < 24 * 60 {
            offset_minutes
        } else {
            0
        };
        Self { offset_minutes }
    }

    pub fn utc() -> Self {
        Self::new(0)
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset_minutes
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Display key of the day containing `epoch_ms`.
    pub fn bucket_key(&self, epoch_ms: i64) -> String {
        match self.offset().timestamp_millis_opt(epoch_ms).single() {
            Some(dt) => dt.format(BUCKET_DATE_FORMAT).to_string(),
            None => String::new(),
        }
    }

    /// Midnight epoch (seconds) of the bucket named by `key`, or 0 when the
    /// key cannot be parsed.
    pub fn sort_key(&self, key: &str) -> i64 {
        NaiveDate::parse_from_str(key, BUCKET_PARSE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .and_then(|midnight| self.offset().from_local_datetime(&midnight).single())
            .map(|dt| dt.timestamp())
            .unwrap_or(0)
    }

    /// `HH:MM` rendering of a timestamp, `None` for non-positive epochs.
    pub fn time_of_day(&self, epoch_ms: i64) -> Option<String> {
        if epoch_ms <= 0 {
            return None;
        }
        self.offset()
            .timestamp_millis_opt(epoch_ms)
            .single()
            .map(|dt| dt.format(TIME_OF_DAY_FORMAT).to_string())
    }
}

impl Default for DateBucketer {
    fn default() -> Self {
        Self::utc()
    }
}
