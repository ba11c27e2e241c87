// tests/admission_test.rs
mod common;

use common::StaticVip;
use std::sync::Arc;
use std::time::Duration;
use ytdlbot::admission::{is_playlist, strip_command, AdmissionController, AdmissionResult, RejectReason};
use ytdlbot::metrics;
use ytdlbot::quota::{MemoryQuotaStore, QuotaStore};

fn controller(cap: u64, vips: &[i64]) -> (AdmissionController, Arc<MemoryQuotaStore>) {
    let quota = Arc::new(MemoryQuotaStore::new(cap, Duration::from_secs(86_400)));
    let store: Arc<dyn QuotaStore> = quota.clone();
    (AdmissionController::new(store, StaticVip::with(vips)), quota)
}

#[test]
fn test_strip_command() {
    assert_eq!(strip_command("/ytdl https://a.b/c"), "https://a.b/c");
    assert_eq!(strip_command("/ytdl@my_bot   https://a.b/c "), "https://a.b/c");
    assert_eq!(strip_command("  https://a.b/c"), "https://a.b/c");
    assert_eq!(strip_command("/ytdl"), "");
}

#[test]
fn test_playlist_detection() {
    assert!(is_playlist("https://www.youtube.com/playlist?list=PL123"));
    assert!(is_playlist("https://www.youtube.com/watch?v=abc&list=PL123"));
    assert!(!is_playlist("https://www.youtube.com/watch?v=abc"));
    assert!(!is_playlist("https://example.com/blacklist=1"));
}

#[tokio::test]
async fn test_accepts_plain_link() {
    let (admission, _) = controller(5, &[]);
    let result = admission.admit(1, "https://www.youtube.com/watch?v=abc").await;
    assert_eq!(
        result,
        AdmissionResult::Accepted("https://www.youtube.com/watch?v=abc".to_string())
    );
}

#[tokio::test]
async fn test_accepts_command_prefixed_link() {
    let (admission, _) = controller(5, &[]);
    let result = admission.admit(1, "/ytdl https://vimeo.com/1234").await;
    assert_eq!(result, AdmissionResult::Accepted("https://vimeo.com/1234".to_string()));
}

#[tokio::test]
async fn test_rejects_non_links() {
    let (admission, _) = controller(5, &[]);
    for text in ["hello there", "www.youtube.com/watch?v=abc", "ftp://host/file", "", "/ytdl"] {
        let result = admission.admit(1, text).await;
        assert_eq!(result, AdmissionResult::Rejected(RejectReason::BadRequest), "{:?}", text);
    }
}

#[tokio::test]
async fn test_playlist_requires_vip() {
    let (admission, _) = controller(5, &[99]);
    let url = "https://www.youtube.com/playlist?list=PL123";

    let result = admission.admit(1, url).await;
    assert_eq!(result, AdmissionResult::Rejected(RejectReason::VipRequired));

    let result = admission.admit(99, url).await;
    assert_eq!(result, AdmissionResult::Accepted(url.to_string()));
}

#[tokio::test]
async fn test_exhausted_quota_is_rejected_first() {
    let (admission, quota) = controller(2, &[]);
    quota.consume(1, 2);

    // even a bad request reports the quota problem
    match admission.admit(1, "not a link").await {
        AdmissionResult::Rejected(RejectReason::QuotaExceeded {
            seconds_until_reset, ..
        }) => {
            assert!(seconds_until_reset > 86_000 && seconds_until_reset <= 86_400);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_single_remaining_unit_admits() {
    let (admission, quota) = controller(5, &[]);
    quota.consume(1, 4);
    let result = admission.admit(1, "https://example.com/v.mp4").await;
    assert!(matches!(result, AdmissionResult::Accepted(_)));
}

#[test]
fn test_reject_reason_counters() {
    assert_eq!(RejectReason::BadRequest.counter(), metrics::BAD_REQUEST);
    assert_eq!(RejectReason::VipRequired.counter(), metrics::PLAYLIST_VIP_REQUIRED);
    let quota = RejectReason::QuotaExceeded {
        seconds_until_reset: 1,
        reset_at: chrono::Local::now(),
    };
    assert_eq!(quota.counter(), metrics::QUOTA_EXCEED);
}
