//! Core data model: devices, samples, aggregation windows and counts.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Label shown for samples whose active window was empty.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Wall-clock format the collectors send
pub const COLLECTOR_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A client agent reporting activity samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub device_name: String,
    pub device_type: String,
    /// Set on first registration, never changed afterwards
    pub first_seen: DateTime<Utc>,
    /// Refreshed on every registration and every accepted sample
    pub last_seen: DateTime<Utc>,
}

/// Input of a device registration. The id is chosen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub id: String,
    pub device_name: String,
    pub device_type: String,
}

impl DeviceRegistration {
    pub fn new(
        id: impl Into<String>,
        device_name: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            device_name: device_name.into(),
            device_type: device_type.into(),
        }
    }
}

/// One stored observation of the foreground window on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Insertion sequence number assigned by the store
    pub id: i64,
    pub device_id: String,
    /// Client-supplied wall-clock time
    pub timestamp: NaiveDateTime,
    /// Foreground application or window title, possibly empty
    #[serde(default, deserialize_with = "deserialize_label")]
    pub active_window: String,
}

/// A sample about to be recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSample {
    pub device_id: String,
    pub timestamp: NaiveDateTime,
    pub active_window: String,
}

impl NewSample {
    pub fn new(
        device_id: impl Into<String>,
        timestamp: NaiveDateTime,
        active_window: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            active_window: active_window.into(),
        }
    }
}

/// Half-open interval `[start, end)` of client wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ActivityWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> StoreResult<Self> {
        if end <= start {
            return Err(StoreError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Midnight to next midnight of `date`
    pub fn day_of(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        Self {
            start,
            end: start + chrono::Duration::days(1),
        }
    }

    /// The current local day, the dashboard's default framing
    pub fn today() -> Self {
        Self::day_of(Local::now().date_naive())
    }

    /// `days` whole days ending at the local midnight following `now`.
    /// `last_days(1, now)` is the day of `now`.
    pub fn last_days(days: u32, now: NaiveDateTime) -> StoreResult<Self> {
        let end = Self::day_of(now.date()).end;
        let start = end
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDateTime::MIN);
        Self::new(start, end)
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Number of samples carrying one activity label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCount {
    pub active_window: String,
    pub samples: u64,
}

impl ActivityCount {
    pub fn new(active_window: impl Into<String>, samples: u64) -> Self {
        Self {
            active_window: active_window.into(),
            samples,
        }
    }

    /// Empty labels are stored as-is and only shown as "Unknown"
    pub fn display_label(&self) -> &str {
        if self.active_window.is_empty() {
            UNKNOWN_LABEL
        } else {
            &self.active_window
        }
    }
}

/// Remote stores may hand back `null` for a missing window title.
pub(crate) fn deserialize_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a timestamp as sent by a client agent.
///
/// Accepts the collector format (`2024-03-01 09:15:00`), ISO naive times
/// (`2024-03-01T09:15:00`, optionally fractional) and RFC 3339 with an
/// offset, which is converted to local wall time.
pub fn parse_client_timestamp(raw: &str) -> StoreResult<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Local).naive_local());
    }

    Err(StoreError::Decode(format!(
        "unrecognised client timestamp: {:?}",
        raw
    )))
}
