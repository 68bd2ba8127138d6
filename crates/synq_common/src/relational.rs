//! Relational Driver - SQLite-backed activity store
//!
//! Schema:
//! - devices: id, name, type, first_seen, last_seen
//! - samples: autoincrement id, device_id -> devices.id, timestamp, active_window
//!
//! A connection is opened per call and dropped on every exit path. Windowing
//! and grouping run store-side in a single query.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{BackendKind, RelationalSettings};
use crate::driver::BackendDriver;
use crate::error::{StoreError, StoreResult};
use crate::types::{ActivityCount, ActivityWindow, Device, DeviceRegistration, NewSample, Sample};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS devices (
        id TEXT PRIMARY KEY,
        device_name TEXT NOT NULL,
        device_type TEXT NOT NULL,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL REFERENCES devices(id),
        timestamp TEXT NOT NULL,
        active_window TEXT NOT NULL DEFAULT ''
    );

    CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON samples(timestamp);
    CREATE INDEX IF NOT EXISTS idx_samples_device_time ON samples(device_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_devices_last_seen ON devices(last_seen);
"#;

pub struct SqliteDriver {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteDriver {
    /// Open (and create if needed) the database described by `settings`
    pub fn open(settings: &RelationalSettings) -> StoreResult<Self> {
        Self::open_with_timeout(&settings.path, Duration::from_secs(settings.busy_timeout_secs))
    }

    /// Open at a specific path with the default busy timeout (for testing)
    pub fn open_at<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::open_with_timeout(path.as_ref(), Duration::from_secs(5))
    }

    fn open_with_timeout(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::unavailable(
                        "relational",
                        format!("cannot create {}: {}", parent.display(), e),
                    )
                })?;
            }
        }

        let driver = Self {
            path: path.to_path_buf(),
            busy_timeout,
        };

        let conn = driver.connect()?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened relational store at {}", path.display());
        Ok(driver)
    }

    fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        device_name: row.get(1)?,
        device_type: row.get(2)?,
        first_seen: row.get(3)?,
        last_seen: row.get(4)?,
    })
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get(0)?,
        device_id: row.get(1)?,
        timestamp: row.get(2)?,
        active_window: row.get(3)?,
    })
}

impl BackendDriver for SqliteDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn upsert_device(
        &self,
        registration: &DeviceRegistration,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO devices (id, device_name, device_type, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                device_name = excluded.device_name,
                device_type = excluded.device_type,
                last_seen = excluded.last_seen",
            params![
                &registration.id,
                &registration.device_name,
                &registration.device_type,
                seen_at
            ],
        )?;
        debug!("Upserted device {}", registration.id);
        Ok(())
    }

    fn fetch_device(&self, id: &str) -> StoreResult<Option<Device>> {
        let conn = self.connect()?;
        let device = conn
            .query_row(
                "SELECT id, device_name, device_type, first_seen, last_seen
                 FROM devices WHERE id = ?1",
                params![id],
                device_from_row,
            )
            .optional()?;
        Ok(device)
    }

    fn fetch_devices(&self) -> StoreResult<Vec<Device>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, device_name, device_type, first_seen, last_seen
             FROM devices ORDER BY last_seen DESC, id ASC",
        )?;
        let rows = stmt.query_map([], device_from_row)?;

        let mut devices = Vec::new();
        for row in rows {
            devices.push(row?);
        }
        Ok(devices)
    }

    fn insert_sample(&self, sample: &NewSample, seen_at: DateTime<Utc>) -> StoreResult<Sample> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let touched = tx.execute(
            "UPDATE devices SET last_seen = ?1 WHERE id = ?2",
            params![seen_at, &sample.device_id],
        )?;
        if touched == 0 {
            // Dropping the transaction rolls it back
            return Err(StoreError::UnknownDevice(sample.device_id.clone()));
        }

        tx.execute(
            "INSERT INTO samples (device_id, timestamp, active_window) VALUES (?1, ?2, ?3)",
            params![&sample.device_id, sample.timestamp, &sample.active_window],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Sample {
            id,
            device_id: sample.device_id.clone(),
            timestamp: sample.timestamp,
            active_window: sample.active_window.clone(),
        })
    }

    fn fetch_samples(&self, device_id: Option<&str>, limit: usize) -> StoreResult<Vec<Sample>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, device_id, timestamp, active_window
             FROM samples
             WHERE (?1 IS NULL OR device_id = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![device_id, limit], sample_from_row)?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?);
        }
        Ok(samples)
    }

    fn count_activity(
        &self,
        device_id: Option<&str>,
        window: &ActivityWindow,
    ) -> StoreResult<Vec<ActivityCount>> {
        let conn = self.connect()?;
        // MIN(id) orders tied labels by first occurrence, matching count_labels
        let mut stmt = conn.prepare(
            r#"
            SELECT active_window, COUNT(*) AS samples, MIN(id) AS first_id
            FROM samples
            WHERE timestamp >= ?1
              AND timestamp < ?2
              AND (?3 IS NULL OR device_id = ?3)
            GROUP BY active_window
            ORDER BY samples DESC, first_id ASC
            "#,
        )?;

        let rows = stmt.query_map(params![window.start, window.end, device_id], |row| {
            Ok(ActivityCount {
                active_window: row.get(0)?,
                samples: row.get::<_, i64>(1)? as u64,
            })
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        debug!(
            "Counted {} labels between {} and {}",
            counts.len(),
            window.start,
            window.end
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    fn test_driver() -> (TempDir, SqliteDriver) {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::open_at(dir.path().join("synq.db")).unwrap();
        (dir, driver)
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_open_creates_parent_directory_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("synq.db");
        SqliteDriver::open_at(&path).unwrap();
        assert!(path.exists());
        // Re-running the schema on an existing database is harmless
        SqliteDriver::open_at(&path).unwrap();
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synq.db");
        {
            let driver = SqliteDriver::open_at(&path).unwrap();
            driver
                .upsert_device(&DeviceRegistration::new("laptop", "Laptop", "linux"), Utc::now())
                .unwrap();
        }
        let driver = SqliteDriver::open_at(&path).unwrap();
        assert!(driver.fetch_device("laptop").unwrap().is_some());
    }

    #[test]
    fn test_unknown_device_rolls_back() {
        let (_dir, driver) = test_driver();
        let sample = NewSample::new("ghost", at("2024-03-01 09:00:00"), "Terminal");
        let err = driver.insert_sample(&sample, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownDevice(ref id) if id == "ghost"));
        assert!(driver.fetch_samples(None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_group_by_tie_break_is_first_occurrence() {
        let (_dir, driver) = test_driver();
        driver
            .upsert_device(&DeviceRegistration::new("laptop", "Laptop", "linux"), Utc::now())
            .unwrap();
        for label in ["Zed", "Alacritty", "Alacritty", "Zed"] {
            driver
                .insert_sample(
                    &NewSample::new("laptop", at("2024-03-01 09:00:00"), label),
                    Utc::now(),
                )
                .unwrap();
        }

        let window = ActivityWindow::day_of(at("2024-03-01 00:00:00").date());
        let counts = driver.count_activity(None, &window).unwrap();
        assert_eq!(
            counts,
            vec![ActivityCount::new("Zed", 2), ActivityCount::new("Alacritty", 2)]
        );
    }

    #[test]
    fn test_insert_returns_increasing_ids() {
        let (_dir, driver) = test_driver();
        driver
            .upsert_device(&DeviceRegistration::new("laptop", "Laptop", "linux"), Utc::now())
            .unwrap();
        let first = driver
            .insert_sample(&NewSample::new("laptop", at("2024-03-01 09:00:00"), "A"), Utc::now())
            .unwrap();
        let second = driver
            .insert_sample(&NewSample::new("laptop", at("2024-03-01 08:00:00"), "B"), Utc::now())
            .unwrap();
        assert!(second.id > first.id);
        assert_eq!(second.timestamp, at("2024-03-01 08:00:00"));
    }
}
