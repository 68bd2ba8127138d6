//! Activity store behaviour on the relational backend.

use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;
use std::thread::{self, sleep};
use std::time::Duration;
use synq_common::relational::SqliteDriver;
use synq_common::{
    ActivityCount, ActivityStore, ActivityWindow, BackendKind, DeviceRegistration, NewSample,
    StoreConfig, StoreError,
};
use tempfile::TempDir;

fn test_store() -> (TempDir, ActivityStore) {
    let dir = tempfile::tempdir().unwrap();
    let driver = SqliteDriver::open_at(dir.path().join("synq.db")).unwrap();
    (dir, ActivityStore::new(Box::new(driver)))
}

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn day(s: &str) -> ActivityWindow {
    ActivityWindow::day_of(at(&format!("{} 00:00:00", s)).date())
}

#[test]
fn test_register_then_get() {
    let (_dir, store) = test_store();
    let id = store
        .register_device(&DeviceRegistration::new("laptop-1", "Work Laptop", "linux"))
        .unwrap();
    assert_eq!(id, "laptop-1");

    let device = store.get_device("laptop-1").unwrap().unwrap();
    assert_eq!(device.device_name, "Work Laptop");
    assert_eq!(device.device_type, "linux");
    assert_eq!(device.first_seen, device.last_seen);

    assert!(store.get_device("missing").unwrap().is_none());
}

#[test]
fn test_reregistration_keeps_first_seen_and_advances_last_seen() {
    let (_dir, store) = test_store();
    store
        .register_device(&DeviceRegistration::new("laptop-1", "Laptop", "linux"))
        .unwrap();
    let first = store.get_device("laptop-1").unwrap().unwrap();

    sleep(Duration::from_millis(10));
    store
        .register_device(&DeviceRegistration::new("laptop-1", "Renamed", "macos"))
        .unwrap();
    let second = store.get_device("laptop-1").unwrap().unwrap();

    assert_eq!(second.first_seen, first.first_seen);
    assert!(second.last_seen > first.last_seen);
    assert_eq!(second.device_name, "Renamed");
    assert_eq!(second.device_type, "macos");
    assert_eq!(store.list_devices().unwrap().len(), 1);
}

#[test]
fn test_empty_device_id_rejected() {
    let (_dir, store) = test_store();
    let err = store
        .register_device(&DeviceRegistration::new("  ", "Laptop", "linux"))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidDeviceId));
}

#[test]
fn test_record_for_unknown_device_fails_and_stores_nothing() {
    let (_dir, store) = test_store();
    let err = store
        .record_sample(&NewSample::new("ghost", at("2024-03-01 09:00:00"), "Firefox"))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownDevice(ref id) if id == "ghost"));
    assert!(store.list_samples(None, 100).unwrap().is_empty());
    assert!(store.get_device("ghost").unwrap().is_none());
}

#[test]
fn test_record_updates_last_seen() {
    let (_dir, store) = test_store();
    store
        .register_device(&DeviceRegistration::new("laptop-1", "Laptop", "linux"))
        .unwrap();
    let registered = store.get_device("laptop-1").unwrap().unwrap();

    sleep(Duration::from_millis(10));
    let before = Utc::now();
    let sample = store
        .record_sample(&NewSample::new("laptop-1", at("2024-03-01 09:00:00"), "Firefox"))
        .unwrap();

    let device = store.get_device("laptop-1").unwrap().unwrap();
    assert!(device.last_seen >= before);
    assert!(device.last_seen > registered.last_seen);
    assert_eq!(device.first_seen, registered.first_seen);
    assert_eq!(sample.active_window, "Firefox");
    assert_eq!(sample.timestamp, at("2024-03-01 09:00:00"));
}

#[test]
fn test_list_devices_most_recent_first() {
    let (_dir, store) = test_store();
    for id in ["a", "b", "c"] {
        store
            .register_device(&DeviceRegistration::new(id, id, "linux"))
            .unwrap();
        sleep(Duration::from_millis(5));
    }
    // A sample makes "a" the most recently active
    store
        .record_sample(&NewSample::new("a", at("2024-03-01 09:00:00"), "Editor"))
        .unwrap();

    let ids: Vec<String> = store
        .list_devices()
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
}

#[test]
fn test_list_samples_limit_and_order() {
    let (_dir, store) = test_store();
    store
        .register_device(&DeviceRegistration::new("laptop", "Laptop", "linux"))
        .unwrap();
    store
        .register_device(&DeviceRegistration::new("desktop", "Desktop", "linux"))
        .unwrap();

    for i in 0..15 {
        let device = if i % 3 == 0 { "desktop" } else { "laptop" };
        store
            .record_sample(&NewSample::new(device, at("2024-03-01 09:00:00"), format!("w{}", i)))
            .unwrap();
    }

    let recent = store.list_recent_samples(None).unwrap();
    assert_eq!(recent.len(), 10);
    let labels: Vec<&str> = recent.iter().map(|s| s.active_window.as_str()).collect();
    assert_eq!(labels[0], "w14");
    assert_eq!(labels[9], "w5");
    assert!(recent.windows(2).all(|w| w[0].id > w[1].id));

    let desktop = store.list_samples(Some("desktop"), 10).unwrap();
    assert_eq!(desktop.len(), 5);
    assert!(desktop.iter().all(|s| s.device_id == "desktop"));
    assert_eq!(desktop[0].active_window, "w12");

    assert!(store.list_samples(None, 0).unwrap().is_empty());
}

#[test]
fn test_most_recent_is_insertion_order_not_timestamp() {
    let (_dir, store) = test_store();
    store
        .register_device(&DeviceRegistration::new("laptop", "Laptop", "linux"))
        .unwrap();
    store
        .record_sample(&NewSample::new("laptop", at("2024-03-02 09:00:00"), "later-clock"))
        .unwrap();
    store
        .record_sample(&NewSample::new("laptop", at("2024-03-01 09:00:00"), "inserted-last"))
        .unwrap();

    let recent = store.list_samples(None, 1).unwrap();
    assert_eq!(recent[0].active_window, "inserted-last");
}

#[test]
fn test_aggregate_activity_ranks_labels() {
    let (_dir, store) = test_store();
    store
        .register_device(&DeviceRegistration::new("laptop", "Laptop", "linux"))
        .unwrap();
    let labels = ["A", "B", "", "B", "A", "B", "", "A", "B", "B"];
    for (i, label) in labels.iter().enumerate() {
        let ts = at("2024-03-01 09:00:00") + chrono::Duration::seconds(5 * i as i64);
        store.record_sample(&NewSample::new("laptop", ts, *label)).unwrap();
    }

    let counts = store.aggregate_activity(None, &day("2024-03-01")).unwrap();
    assert_eq!(
        counts,
        vec![
            ActivityCount::new("B", 5),
            ActivityCount::new("A", 3),
            ActivityCount::new("", 2),
        ]
    );
    assert_eq!(counts[2].display_label(), "Unknown");
}

#[test]
fn test_aggregate_window_is_half_open_and_filters_device() {
    let (_dir, store) = test_store();
    for id in ["laptop", "desktop"] {
        store
            .register_device(&DeviceRegistration::new(id, id, "linux"))
            .unwrap();
    }
    let samples = [
        ("laptop", "2024-02-29 23:59:59", "Yesterday"),
        ("laptop", "2024-03-01 00:00:00", "Terminal"),
        ("laptop", "2024-03-01 23:59:59", "Terminal"),
        ("desktop", "2024-03-01 12:00:00", "Steam"),
        ("laptop", "2024-03-02 00:00:00", "Tomorrow"),
    ];
    for (device, ts, label) in samples {
        store.record_sample(&NewSample::new(device, at(ts), label)).unwrap();
    }

    let all = store.aggregate_activity(None, &day("2024-03-01")).unwrap();
    assert_eq!(
        all,
        vec![ActivityCount::new("Terminal", 2), ActivityCount::new("Steam", 1)]
    );

    let laptop = store
        .aggregate_activity(Some("laptop"), &day("2024-03-01"))
        .unwrap();
    assert_eq!(laptop, vec![ActivityCount::new("Terminal", 2)]);

    let empty = store
        .aggregate_activity(None, &day("2024-01-01"))
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn test_activity_summary_percentages() {
    let (_dir, store) = test_store();
    store
        .register_device(&DeviceRegistration::new("laptop", "Laptop", "linux"))
        .unwrap();
    for label in ["Editor", "Editor", "Browser"] {
        store
            .record_sample(&NewSample::new("laptop", at("2024-03-01 10:00:00"), label))
            .unwrap();
    }

    let summary = store
        .activity_summary(None, &day("2024-03-01"), 5)
        .unwrap();
    assert_eq!(summary.total_samples, 3);
    assert_eq!(summary.shares[0].label, "Editor");
    assert_eq!(summary.shares[0].percentage, 66.67);
    assert_eq!(summary.shares[1].percentage, 33.33);
    assert_eq!(summary.shares[0].elapsed.total_seconds, 10);

    let nothing = store
        .activity_summary(None, &day("2024-01-01"), 5)
        .unwrap();
    assert!(nothing.is_empty());
}

#[test]
fn test_from_config_selects_relational() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::default();
    config.relational.path = dir.path().join("data").join("synq.db");

    let store = ActivityStore::from_config(&config).unwrap();
    assert_eq!(store.backend(), BackendKind::Relational);
    store
        .register_device(&DeviceRegistration::new("laptop", "Laptop", "linux"))
        .unwrap();
    assert_eq!(store.list_devices().unwrap().len(), 1);
}

#[test]
fn test_unreachable_database_is_backend_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let err = SqliteDriver::open_at(blocker.join("synq.db")).err().unwrap();
    assert!(matches!(err, StoreError::BackendUnavailable { .. }));
    assert!(err.is_retryable());
}

#[test]
fn test_concurrent_registration_and_ingest() {
    const THREADS: usize = 8;
    const ITERATIONS: usize = 50;

    let (_dir, store) = test_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..ITERATIONS {
                    store.register_device(&DeviceRegistration::new(
                        "shared",
                        format!("Writer {}", t),
                        "linux",
                    ))?;
                    let ts = at("2024-03-01 12:00:00") + chrono::Duration::seconds(i as i64);
                    store.record_sample(&NewSample::new("shared", ts, "Editor"))?;
                }
                Ok::<(), StoreError>(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(store.list_devices().unwrap().len(), 1);
    let counts = store.aggregate_activity(None, &day("2024-03-01")).unwrap();
    assert_eq!(
        counts,
        vec![ActivityCount::new("Editor", (THREADS * ITERATIONS) as u64)]
    );
    let device = store.get_device("shared").unwrap().unwrap();
    assert!(device.first_seen <= device.last_seen);
}
