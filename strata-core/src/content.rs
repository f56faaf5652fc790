use crate::error::{Result, StrataError};
use bytes::Bytes;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sequence number assigned to the first item of every channel.
pub const FIRST_SEQUENCE: i64 = 1000;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "CACHE")]
    Cache,
    #[serde(rename = "LONG_TERM")]
    LongTerm,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cache => "CACHE",
            Tier::LongTerm => "LONG_TERM",
        }
    }
}

impl FromStr for Tier {
    type Err = StrataError;

    fn from_str(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("CACHE") {
            Ok(Tier::Cache)
        } else if value.eq_ignore_ascii_case("LONG_TERM") {
            Ok(Tier::LongTerm)
        } else {
            Err(StrataError::InvalidRequest(format!(
                "unknown location: {}",
                value
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationState {
    Pending,
    Replicated,
}

impl ReplicationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationState::Pending => "pending",
            ReplicationState::Replicated => "replicated",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(ReplicationState::Pending),
            "replicated" => Ok(ReplicationState::Replicated),
            other => Err(StrataError::Internal(format!(
                "unexpected replication state: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub sequence: i64,
    pub timestamp_micros: i64,
}

impl ItemKey {
    pub fn timestamp(&self) -> DateTime<Utc> {
        micros_to_datetime(self.timestamp_micros)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub channel_id: String,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    pub size_bytes: u64,
    pub sha256: String,
    pub replication: ReplicationState,
}

impl ItemRecord {
    pub fn key(&self) -> ItemKey {
        ItemKey {
            sequence: self.sequence,
            timestamp_micros: self.timestamp.timestamp_micros(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub record: ItemRecord,
    pub payload: Bytes,
}

/// Reference handed back to the ingesting client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub channel: String,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
}

impl ItemRef {
    pub fn path(&self) -> String {
        format!("channel/{}/{}", self.channel, self.sequence)
    }
}

pub fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeUnit {
    fn duration(&self) -> Duration {
        match self {
            TimeUnit::Day => Duration::days(1),
            TimeUnit::Hour => Duration::hours(1),
            TimeUnit::Minute => Duration::minutes(1),
            TimeUnit::Second => Duration::seconds(1),
        }
    }

    fn path_format(&self) -> &'static str {
        match self {
            TimeUnit::Day => "%Y/%m/%d",
            TimeUnit::Hour => "%Y/%m/%d/%H",
            TimeUnit::Minute => "%Y/%m/%d/%H/%M",
            TimeUnit::Second => "%Y/%m/%d/%H/%M/%S",
        }
    }
}

/// A UTC calendar window such as `2024/03/05/14/07` (one minute).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBucket {
    pub unit: TimeUnit,
    pub start: DateTime<Utc>,
}

impl TimeBucket {
    /// Parses `year/month/day[/hour[/minute[/second]]]` path segments.
    pub fn from_segments(segments: &[&str]) -> Result<Self> {
        let unit = match segments.len() {
            3 => TimeUnit::Day,
            4 => TimeUnit::Hour,
            5 => TimeUnit::Minute,
            6 => TimeUnit::Second,
            other => {
                return Err(StrataError::InvalidRequest(format!(
                    "time bucket needs 3 to 6 path segments, got {}",
                    other
                )));
            }
        };

        let year = parse_segment::<i32>(segments[0], "year")?;
        let mut fields = [0u32; 5];
        for (index, segment) in segments[1..].iter().enumerate() {
            fields[index] = parse_segment::<u32>(segment, "time field")?;
        }

        let start = Utc
            .with_ymd_and_hms(year, fields[0], fields[1], fields[2], fields[3], fields[4])
            .single()
            .ok_or_else(|| {
                StrataError::InvalidRequest(format!(
                    "invalid time bucket: {}",
                    segments.join("/")
                ))
            })?;

        Ok(Self { unit, start })
    }

    pub fn containing(timestamp: DateTime<Utc>, unit: TimeUnit) -> Self {
        let day = Utc
            .with_ymd_and_hms(timestamp.year(), timestamp.month(), timestamp.day(), 0, 0, 0)
            .single()
            .unwrap_or(timestamp);

        let start = match unit {
            TimeUnit::Day => day,
            TimeUnit::Hour => day + Duration::hours(timestamp.hour() as i64),
            TimeUnit::Minute => {
                day + Duration::hours(timestamp.hour() as i64)
                    + Duration::minutes(timestamp.minute() as i64)
            }
            TimeUnit::Second => {
                day + Duration::hours(timestamp.hour() as i64)
                    + Duration::minutes(timestamp.minute() as i64)
                    + Duration::seconds(timestamp.second() as i64)
            }
        };

        Self { unit, start }
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.unit.duration()
    }

    pub fn start_micros(&self) -> i64 {
        self.start.timestamp_micros()
    }

    /// Exclusive upper bound.
    pub fn end_micros(&self) -> i64 {
        self.end().timestamp_micros()
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end()
    }

    pub fn previous(&self) -> Self {
        Self {
            unit: self.unit,
            start: self.start - self.unit.duration(),
        }
    }

    pub fn next(&self) -> Self {
        Self {
            unit: self.unit,
            start: self.end(),
        }
    }

    pub fn path(&self) -> String {
        self.start.format(self.unit.path_format()).to_string()
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn parse_segment<T: FromStr>(segment: &str, field: &str) -> Result<T> {
    segment.parse::<T>().map_err(|_| {
        StrataError::InvalidRequest(format!("invalid {} in time bucket: {}", field, segment))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_bucket_from_segments() {
        let bucket = TimeBucket::from_segments(&["2024", "03", "05", "14", "07"]).unwrap();
        assert_eq!(bucket.unit, TimeUnit::Minute);
        assert_eq!(bucket.path(), "2024/03/05/14/07");
        assert_eq!(bucket.previous().path(), "2024/03/05/14/06");
        assert_eq!(bucket.next().path(), "2024/03/05/14/08");
        assert_eq!(bucket.end_micros() - bucket.start_micros(), 60_000_000);
    }

    #[test]
    fn day_bucket_rolls_over_month() {
        let bucket = TimeBucket::from_segments(&["2024", "02", "29"]).unwrap();
        assert_eq!(bucket.next().path(), "2024/03/01");
        assert!(TimeBucket::from_segments(&["2023", "02", "29"]).is_err());
        assert!(TimeBucket::from_segments(&["2024", "02"]).is_err());
        assert!(TimeBucket::from_segments(&["2024", "xx", "01"]).is_err());
    }

    #[test]
    fn containing_truncates_to_unit() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 42).unwrap() + Duration::microseconds(17);
        let minute = TimeBucket::containing(ts, TimeUnit::Minute);
        assert_eq!(minute.path(), "2024/03/05/14/07");
        assert!(minute.contains(ts));
        assert!(!minute.next().contains(ts));

        let second = TimeBucket::containing(ts, TimeUnit::Second);
        assert_eq!(second.path(), "2024/03/05/14/07/42");
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("long_term".parse::<Tier>().unwrap(), Tier::LongTerm);
        assert_eq!("CACHE".parse::<Tier>().unwrap(), Tier::Cache);
        assert!("S3".parse::<Tier>().is_err());
    }
}
