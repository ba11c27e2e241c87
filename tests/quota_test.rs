// tests/quota_test.rs
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use ytdlbot::quota::{load_quota_state, save_quota_state, MemoryQuotaStore, QuotaMode, QuotaStore};

const DAY: Duration = Duration::from_secs(86_400);

#[test]
fn test_absent_user_has_full_quota() {
    let store = MemoryQuotaStore::new(5, DAY);
    let status = store.remaining(42);
    assert_eq!(status.units_remaining, 5);
    assert_eq!(status.seconds_until_reset, 0);
}

#[test]
fn test_consume_opens_window() {
    let store = MemoryQuotaStore::new(5, DAY);
    let now = Utc::now();
    store.consume_at(1, 2, now);

    let status = store.remaining_at(1, now);
    assert_eq!(status.units_remaining, 3);
    assert_eq!(status.seconds_until_reset, 86_400);

    // other users are unaffected
    assert_eq!(store.remaining_at(2, now).units_remaining, 5);
}

#[test]
fn test_overshoot_goes_negative() {
    let store = MemoryQuotaStore::new(100, DAY);
    let now = Utc::now();
    store.consume_at(1, 250, now);
    assert_eq!(store.remaining_at(1, now).units_remaining, -150);
}

#[test]
fn test_expired_window_restores_quota() {
    let store = MemoryQuotaStore::new(5, Duration::from_secs(60));
    let now = Utc::now();
    store.consume_at(1, 5, now);
    assert_eq!(store.remaining_at(1, now).units_remaining, 0);

    let later = now + ChronoDuration::seconds(61);
    let status = store.remaining_at(1, later);
    assert_eq!(status.units_remaining, 5);
    assert_eq!(status.seconds_until_reset, 0);

    // consuming after expiry starts a fresh window
    store.consume_at(1, 1, later);
    assert_eq!(store.remaining_at(1, later).units_remaining, 4);
}

#[test]
fn test_reset_all_restores_everyone() {
    let store = MemoryQuotaStore::new(5, DAY);
    for user in 0..10 {
        store.consume(user, 5);
    }
    assert_eq!(store.remaining(3).units_remaining, 0);

    store.reset_all();
    for user in 0..10 {
        let status = store.remaining(user);
        assert_eq!(status.units_remaining, 5);
        assert_eq!(status.seconds_until_reset, 0);
    }
}

#[test]
fn test_concurrent_consume_sums_exactly() {
    let store = Arc::new(MemoryQuotaStore::new(1_000_000, DAY));
    let threads: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    store.consume(7, 3);
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }

    assert_eq!(store.remaining(7).units_remaining, 1_000_000 - 8 * 1000 * 3);
}

#[test]
fn test_quota_mode_units() {
    assert_eq!(QuotaMode::Requests.units_for(123_456), 1);
    assert_eq!(QuotaMode::Bytes.units_for(123_456), 123_456);
    assert_eq!(QuotaMode::default(), QuotaMode::Requests);
}

#[test]
fn test_restore_drops_expired_records() {
    let store = MemoryQuotaStore::new(5, Duration::from_secs(60));
    let now = Utc::now();
    store.consume_at(1, 2, now - ChronoDuration::seconds(120));
    store.consume_at(2, 3, now);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.records.len(), 2);

    let restored = MemoryQuotaStore::new(5, Duration::from_secs(60));
    restored.restore(snapshot, now);
    assert_eq!(restored.snapshot().records.len(), 1);
    assert_eq!(restored.remaining_at(2, now).units_remaining, 2);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quota.json");

    let store = MemoryQuotaStore::new(5, DAY);
    store.consume(11, 4);
    save_quota_state(&store, path.clone()).await.unwrap();
    assert!(path.exists());

    let reloaded = MemoryQuotaStore::new(5, DAY);
    load_quota_state(&reloaded, path).await.unwrap();
    assert_eq!(reloaded.remaining(11).units_remaining, 1);
}

#[tokio::test]
async fn test_missing_state_file_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let store = MemoryQuotaStore::new(5, DAY);
    load_quota_state(&store, dir.path().join("absent.json")).await.unwrap();
    assert!(store.snapshot().records.is_empty());
}
