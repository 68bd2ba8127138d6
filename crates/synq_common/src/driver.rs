//! Backend Driver capability
//!
//! Raw storage operations against one concrete store. The facade in
//! `store` is written purely against this trait; the two implementations
//! live in `relational` and `remote`.

use chrono::{DateTime, Utc};

use crate::config::BackendKind;
use crate::error::StoreResult;
use crate::types::{ActivityCount, ActivityWindow, Device, DeviceRegistration, NewSample, Sample};

pub trait BackendDriver: Send + Sync {
    /// Which backend this driver talks to
    fn kind(&self) -> BackendKind;

    /// Insert the device or update name/type/last_seen of an existing one.
    /// `first_seen` is only written on insert.
    fn upsert_device(
        &self,
        registration: &DeviceRegistration,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    fn fetch_device(&self, id: &str) -> StoreResult<Option<Device>>;

    /// All devices, most recently seen first
    fn fetch_devices(&self) -> StoreResult<Vec<Device>>;

    /// Store the sample and set the device's last_seen to `seen_at`.
    /// Fails with `UnknownDevice` and writes nothing if the device is missing.
    fn insert_sample(&self, sample: &NewSample, seen_at: DateTime<Utc>) -> StoreResult<Sample>;

    /// Newest first by insertion order, at most `limit` rows
    fn fetch_samples(&self, device_id: Option<&str>, limit: usize) -> StoreResult<Vec<Sample>>;

    /// Per-label counts inside `window`, ranked by count then first occurrence
    fn count_activity(
        &self,
        device_id: Option<&str>,
        window: &ActivityWindow,
    ) -> StoreResult<Vec<ActivityCount>>;
}
