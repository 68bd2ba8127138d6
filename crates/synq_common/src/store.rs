//! Persistence Facade
//!
//! `ActivityStore` is the backend-agnostic entry point used by ingestion and
//! dashboard callers. It holds one driver, chosen once at startup, and
//! never branches on which backend that is. Driver errors pass through
//! unchanged.

use chrono::Utc;
use tracing::{debug, info};

use crate::aggregate::ActivitySummary;
use crate::config::{BackendKind, StoreConfig};
use crate::driver::BackendDriver;
use crate::error::{StoreError, StoreResult};
use crate::relational::SqliteDriver;
use crate::remote::RemoteDriver;
use crate::types::{ActivityCount, ActivityWindow, Device, DeviceRegistration, NewSample, Sample};

/// Rows returned by `list_recent_samples`
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

pub struct ActivityStore {
    driver: Box<dyn BackendDriver>,
}

impl ActivityStore {
    pub fn new(driver: Box<dyn BackendDriver>) -> Self {
        Self { driver }
    }

    /// Build the driver selected in configuration
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        let driver: Box<dyn BackendDriver> = match config.backend {
            BackendKind::Relational => Box::new(SqliteDriver::open(&config.relational)?),
            BackendKind::Remote => Box::new(RemoteDriver::connect(&config.remote)?),
        };
        info!("Activity store using {} backend", driver.kind().as_str());
        Ok(Self::new(driver))
    }

    pub fn backend(&self) -> BackendKind {
        self.driver.kind()
    }

    /// Insert or refresh a device and return its id.
    ///
    /// The id comes from the caller; callers without one generate it before
    /// calling. `first_seen` is only set when the device is created.
    pub fn register_device(&self, registration: &DeviceRegistration) -> StoreResult<String> {
        if registration.id.trim().is_empty() {
            return Err(StoreError::InvalidDeviceId);
        }
        self.driver.upsert_device(registration, Utc::now())?;
        debug!("Registered device {}", registration.id);
        Ok(registration.id.clone())
    }

    pub fn get_device(&self, id: &str) -> StoreResult<Option<Device>> {
        self.driver.fetch_device(id)
    }

    /// All devices, most recently active first
    pub fn list_devices(&self) -> StoreResult<Vec<Device>> {
        self.driver.fetch_devices()
    }

    /// Record one sample and refresh the device's last_seen.
    ///
    /// Precondition: the device is registered. A sample for an unknown
    /// device fails with `UnknownDevice` and nothing is stored; devices are
    /// never created implicitly.
    pub fn record_sample(&self, sample: &NewSample) -> StoreResult<Sample> {
        let stored = self.driver.insert_sample(sample, Utc::now())?;
        debug!("Recorded sample {} for {}", stored.id, stored.device_id);
        Ok(stored)
    }

    /// Newest samples first, at most `limit`
    pub fn list_samples(&self, device_id: Option<&str>, limit: usize) -> StoreResult<Vec<Sample>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.driver.fetch_samples(device_id, limit)
    }

    pub fn list_recent_samples(&self, device_id: Option<&str>) -> StoreResult<Vec<Sample>> {
        self.list_samples(device_id, DEFAULT_SAMPLE_LIMIT)
    }

    /// Sample counts per activity label in `[window.start, window.end)`,
    /// highest count first
    pub fn aggregate_activity(
        &self,
        device_id: Option<&str>,
        window: &ActivityWindow,
    ) -> StoreResult<Vec<ActivityCount>> {
        self.driver.count_activity(device_id, window)
    }

    /// `aggregate_activity` with percentages and elapsed time per label
    pub fn activity_summary(
        &self,
        device_id: Option<&str>,
        window: &ActivityWindow,
        sample_interval_secs: u64,
    ) -> StoreResult<ActivitySummary> {
        let counts = self.aggregate_activity(device_id, window)?;
        Ok(ActivitySummary::from_counts(&counts, sample_interval_secs))
    }
}
