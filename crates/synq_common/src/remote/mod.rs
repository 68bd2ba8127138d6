//! Remote-API Driver - PostgREST-style REST store
//!
//! The store caps every response at `page_size` rows and offers no
//! server-side GROUP BY, so window reads are paginated by offset and the
//! label counts are computed locally.
//!
//! `page_size` must match the server's max-rows. A short page is taken as
//! the end of the data, so a server capping below `page_size` makes every
//! read stop after its first page.
//!
//! Consistency gap: `insert_sample` is three independent calls (device
//! check, sample insert, last_seen update). If the last_seen update fails
//! after the insert succeeded, the sample stays stored with a stale
//! last_seen and the error is returned to the caller. Nothing is rolled back.

pub mod memory;
pub mod transport;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::aggregate::count_labels;
use crate::config::{BackendKind, RemoteSettings};
use crate::driver::BackendDriver;
use crate::error::{StoreError, StoreResult};
use crate::types::{ActivityCount, ActivityWindow, Device, DeviceRegistration, NewSample, Sample};

pub use memory::MemoryRestTransport;
pub use transport::{FilterOp, HttpRestTransport, RestMethod, RestRequest, RestTransport};

const DEVICES: &str = "devices";
const SAMPLES: &str = "samples";

/// Format window bounds the same way serde writes sample timestamps
fn format_bound(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> StoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}

pub struct RemoteDriver {
    transport: Box<dyn RestTransport>,
    page_size: usize,
}

impl RemoteDriver {
    pub fn new(transport: Box<dyn RestTransport>, page_size: usize) -> Self {
        Self {
            transport,
            page_size: page_size.max(1),
        }
    }

    /// Build the HTTP transport from settings
    pub fn connect(settings: &RemoteSettings) -> StoreResult<Self> {
        let transport = HttpRestTransport::new(settings)?;
        Ok(Self::new(Box::new(transport), settings.effective_page_size()))
    }

    fn call(&self, request: &RestRequest) -> StoreResult<Vec<Value>> {
        self.transport.execute(request).map_err(|e| {
            error!(
                "Remote {} {} failed: {}",
                request.method.as_str(),
                request.table,
                e
            );
            e
        })
    }

    /// Read every row of an ordered query, one capped page at a time.
    ///
    /// Stops on an empty page or a page shorter than requested. With
    /// `max_rows` set, stops once that many rows were collected.
    fn read_pages(&self, base: &RestRequest, max_rows: Option<usize>) -> StoreResult<Vec<Value>> {
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            let want = match max_rows {
                Some(max) => max.saturating_sub(rows.len()).min(self.page_size),
                None => self.page_size,
            };
            if want == 0 {
                break;
            }

            let page = self.call(&base.clone().range(offset, want))?;
            let received = page.len();
            if received > want {
                error!(
                    "Remote page at offset {} returned {} rows for a {}-row request",
                    offset, received, want
                );
                return Err(StoreError::PaginationExhaustionMismatch {
                    offset,
                    page_size: want,
                    received,
                });
            }
            if received == 0 {
                break;
            }

            rows.extend(page);
            if received < want {
                break;
            }
            offset += want;
        }

        debug!("Read {} rows from {} in pages of {}", rows.len(), base.table, self.page_size);
        Ok(rows)
    }

    fn device_exists(&self, id: &str) -> StoreResult<bool> {
        let rows = self.call(&RestRequest::get(DEVICES).select("id").eq("id", id).range(0, 1))?;
        Ok(!rows.is_empty())
    }
}

impl BackendDriver for RemoteDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn upsert_device(
        &self,
        registration: &DeviceRegistration,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        // Insert-if-absent keeps first_seen from the first registration
        let created = self.call(
            &RestRequest::post(
                DEVICES,
                json!({
                    "id": registration.id,
                    "device_name": registration.device_name,
                    "device_type": registration.device_type,
                    "first_seen": seen_at,
                    "last_seen": seen_at,
                }),
            )
            .prefer("resolution=ignore-duplicates"),
        )?;
        if !created.is_empty() {
            debug!("Created device {}", registration.id);
            return Ok(());
        }

        self.call(
            &RestRequest::patch(
                DEVICES,
                json!({
                    "device_name": registration.device_name,
                    "device_type": registration.device_type,
                    "last_seen": seen_at,
                }),
            )
            .eq("id", registration.id.as_str()),
        )?;
        debug!("Updated device {}", registration.id);
        Ok(())
    }

    fn fetch_device(&self, id: &str) -> StoreResult<Option<Device>> {
        let rows = self.call(&RestRequest::get(DEVICES).select("*").eq("id", id).range(0, 1))?;
        Ok(decode_rows::<Device>(rows)?.into_iter().next())
    }

    fn fetch_devices(&self) -> StoreResult<Vec<Device>> {
        let base = RestRequest::get(DEVICES)
            .select("*")
            .order_by("last_seen", true)
            .order_by("id", false);
        decode_rows(self.read_pages(&base, None)?)
    }

    fn insert_sample(&self, sample: &NewSample, seen_at: DateTime<Utc>) -> StoreResult<Sample> {
        if !self.device_exists(&sample.device_id)? {
            return Err(StoreError::UnknownDevice(sample.device_id.clone()));
        }

        let inserted = self.call(&RestRequest::post(
            SAMPLES,
            json!({
                "device_id": sample.device_id,
                "timestamp": sample.timestamp,
                "active_window": sample.active_window,
            }),
        ))?;
        let stored = decode_rows::<Sample>(inserted)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no sample row".to_string()))?;

        let touched = self.call(
            &RestRequest::patch(DEVICES, json!({ "last_seen": seen_at }))
                .eq("id", sample.device_id.as_str()),
        );
        if let Err(e) = touched {
            warn!(
                "Sample {} stored but last_seen of {} not updated",
                stored.id, sample.device_id
            );
            return Err(e);
        }

        Ok(stored)
    }

    fn fetch_samples(&self, device_id: Option<&str>, limit: usize) -> StoreResult<Vec<Sample>> {
        let mut base = RestRequest::get(SAMPLES).select("*");
        if let Some(id) = device_id {
            base = base.eq("device_id", id);
        }
        let base = base.order_by("id", true);
        decode_rows(self.read_pages(&base, Some(limit))?)
    }

    fn count_activity(
        &self,
        device_id: Option<&str>,
        window: &ActivityWindow,
    ) -> StoreResult<Vec<ActivityCount>> {
        let mut base = RestRequest::get(SAMPLES)
            .select("id,active_window")
            .filter("timestamp", FilterOp::Gte, format_bound(window.start))
            .filter("timestamp", FilterOp::Lt, format_bound(window.end));
        if let Some(id) = device_id {
            base = base.eq("device_id", id);
        }
        let base = base.order_by("id", false);

        let rows = self.read_pages(&base, None)?;
        Ok(count_labels(rows.iter().map(|row| {
            row.get("active_window").and_then(Value::as_str).unwrap_or("")
        })))
    }
}
