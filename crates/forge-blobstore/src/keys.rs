//! Storage key and container naming.
//!
//! A storage key reads `<kind>-<yyyymmdd>|<name>`. Everything before the first
//! `|` is the container suffix; the rest is the blob name, which may be
//! hierarchical (`/`-separated) but never contains `|`. Containers are named
//! `<hub>-<container suffix>`, so every key written on one day for one kind
//! lands in the same container and retention deletes whole containers.

use crate::store::{BlobStoreError, BlobStoreResult};
use crate::types::{BlobKind, OrchestrationInstance, ParsedKey};
use chrono::{DateTime, Datelike, NaiveDate, Utc};

pub const KEY_DELIMITER: char = '|';
pub const CONTAINER_DELIMITER: char = '-';
pub const BLOB_NAME_DELIMITER: char = '/';

const DAY_SEGMENT_LEN: usize = 8;
const MAX_DAY_SEGMENT_YEAR: i32 = 9999;
const MISSING_INSTANCE_SEGMENT: &str = "null";

/// Which calendar day a key is bucketed under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DaySource {
    /// The current UTC date at the time the key is built.
    #[default]
    Today,
    /// A logical date, e.g. the fire time of a scheduled message.
    At(NaiveDate),
}

impl DaySource {
    pub fn resolve(self) -> NaiveDate {
        match self {
            DaySource::Today => Utc::now().date_naive(),
            DaySource::At(day) => day,
        }
    }
}

impl From<NaiveDate> for DaySource {
    fn from(day: NaiveDate) -> Self {
        DaySource::At(day)
    }
}

impl From<DateTime<Utc>> for DaySource {
    fn from(timestamp: DateTime<Utc>) -> Self {
        DaySource::At(timestamp.date_naive())
    }
}

impl From<Option<DateTime<Utc>>> for DaySource {
    fn from(timestamp: Option<DateTime<Utc>>) -> Self {
        timestamp.map(DaySource::from).unwrap_or_default()
    }
}

pub fn format_day_segment(day: NaiveDate) -> String {
    day.format("%Y%m%d").to_string()
}

/// Parses exactly eight ASCII digits as `yyyymmdd`.
pub fn parse_day_segment(segment: &str) -> Option<NaiveDate> {
    if segment.len() != DAY_SEGMENT_LEN || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = segment[0..4].parse::<i32>().ok()?;
    let month = segment[4..6].parse::<u32>().ok()?;
    let day = segment[6..8].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn build_key(kind: BlobKind, day: DaySource, name: &str) -> BlobStoreResult<String> {
    if name.is_empty() {
        return Err(BlobStoreError::MalformedKey {
            key: String::new(),
            reason: "blob name must not be empty".to_string(),
        });
    }
    if name.contains(KEY_DELIMITER) {
        return Err(BlobStoreError::MalformedKey {
            key: name.to_string(),
            reason: format!("blob name must not contain '{KEY_DELIMITER}'"),
        });
    }
    let day = day.resolve();
    // Only four-digit years fit the day segment.
    if !(0..=MAX_DAY_SEGMENT_YEAR).contains(&day.year()) {
        return Err(BlobStoreError::InvalidInput(format!(
            "day {day} cannot be bucketed; the year must be between 0 and {MAX_DAY_SEGMENT_YEAR}"
        )));
    }
    Ok(format!(
        "{}{CONTAINER_DELIMITER}{}{KEY_DELIMITER}{name}",
        kind.as_str(),
        format_day_segment(day)
    ))
}

fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn join_name(segments: &[&str]) -> String {
    segments.join(&BLOB_NAME_DELIMITER.to_string())
}

pub fn build_storage_key(created: DaySource) -> BlobStoreResult<String> {
    build_key(BlobKind::Blob, created, &unique_id())
}

pub fn build_message_storage_key(
    instance: Option<&OrchestrationInstance>,
    fire_time: DaySource,
) -> BlobStoreResult<String> {
    let segment = |value: Option<&str>| match value {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => MISSING_INSTANCE_SEGMENT.to_string(),
    };
    let instance_id = segment(instance.map(|i| i.instance_id.as_str()));
    let execution_id = segment(instance.map(|i| i.execution_id.as_str()));
    let id = unique_id();
    build_key(
        BlobKind::Message,
        fire_time,
        &join_name(&[&instance_id, &execution_id, &id]),
    )
}

pub fn build_session_storage_key(session_id: &str) -> BlobStoreResult<String> {
    if session_id.is_empty() {
        return Err(BlobStoreError::InvalidInput(
            "session id must not be empty".to_string(),
        ));
    }
    let id = unique_id();
    build_key(
        BlobKind::Session,
        DaySource::Today,
        &join_name(&[session_id, &id]),
    )
}

/// Splits `key` on its first `|`.
pub fn parse_key(key: &str) -> BlobStoreResult<ParsedKey> {
    let Some((container_suffix, blob_name)) = key.split_once(KEY_DELIMITER) else {
        return Err(BlobStoreError::MalformedKey {
            key: key.to_string(),
            reason: "expected <container suffix>|<blob name>".to_string(),
        });
    };
    if container_suffix.is_empty() || blob_name.is_empty() {
        return Err(BlobStoreError::MalformedKey {
            key: key.to_string(),
            reason: "container suffix and blob name must both be non-empty".to_string(),
        });
    }
    Ok(ParsedKey {
        container_suffix: container_suffix.to_string(),
        blob_name: blob_name.to_string(),
    })
}

impl ParsedKey {
    pub fn kind(&self) -> Option<BlobKind> {
        let (kind, _) = self.container_suffix.split_once(CONTAINER_DELIMITER)?;
        BlobKind::parse(kind)
    }

    pub fn day(&self) -> Option<NaiveDate> {
        let day = self
            .container_suffix
            .rsplit(CONTAINER_DELIMITER)
            .next()?;
        parse_day_segment(day)
    }
}

pub fn container_name(prefix: &str, suffix: &str) -> String {
    format!("{prefix}{CONTAINER_DELIMITER}{suffix}")
}

/// True iff the trailing date of `container_name` is strictly before `threshold`.
///
/// Accepts `<hub>-<yyyymmdd>` and `<hub>-<kind>-<yyyymmdd>`.
pub fn is_container_expired(container_name: &str, threshold: NaiveDate) -> BlobStoreResult<bool> {
    let segments: Vec<&str> = container_name.split(CONTAINER_DELIMITER).collect();
    if !(2..=3).contains(&segments.len()) || segments.iter().any(|s| s.is_empty()) {
        return Err(BlobStoreError::MalformedContainerName {
            container_name: container_name.to_string(),
            reason: "expected <prefix>-<yyyymmdd> or <prefix>-<kind>-<yyyymmdd>".to_string(),
        });
    }
    let date_segment = segments[segments.len() - 1];
    let Some(container_day) = parse_day_segment(date_segment) else {
        return Err(BlobStoreError::MalformedContainerName {
            container_name: container_name.to_string(),
            reason: format!("'{date_segment}' is not a yyyymmdd date"),
        });
    };
    Ok(container_day < threshold)
}

/// Hub names prefix every container and must not contain either delimiter.
pub fn validate_hub_name(hub_name: &str) -> BlobStoreResult<()> {
    if hub_name.is_empty() {
        return Err(BlobStoreError::InvalidInput(
            "hub name must not be empty".to_string(),
        ));
    }
    if !hub_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(BlobStoreError::InvalidInput(format!(
            "hub name '{hub_name}' must be lowercase ascii letters and digits only"
        )));
    }
    Ok(())
}
