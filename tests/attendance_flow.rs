use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use rollcall::db::models::{AttendanceRecord, RegisteredFace};
use rollcall::db::Database;
use rollcall::reconciler::{build_report, Decision, RecognitionEvent, Reconciler, ReportWindow};

/// Drives the whole pipeline the way the camera client does: a recognizer
/// observation every 100ms, admitted events persisted, then a report over the
/// class window.
#[tokio::test]
async fn camera_stream_to_attendance_report() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("rollcall.sqlite3")).unwrap();
    let gate = Reconciler::new(0.6, 10);

    for name in ["Alice", "Carol"] {
        db.upsert_face(&RegisteredFace {
            name: name.to_string(),
            descriptor: vec![0.1, -0.2, 0.3],
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    let class_start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let class_end = class_start + Duration::minutes(30);

    // Alice sits in view for the first 12 minutes; Carol never shows up.
    let mut offset_ms: i64 = 0;
    while offset_ms < 12 * 60 * 1000 {
        let event = RecognitionEvent {
            name: "Alice".to_string(),
            distance: 0.38,
            observed_at: class_start + Duration::milliseconds(offset_ms),
        };

        if gate.observe(&event) == Decision::Admitted {
            db.insert_attendance(&AttendanceRecord {
                id: Uuid::new_v4().to_string(),
                name: event.name,
                marked_at: event.observed_at,
                distance: event.distance,
            })
            .await
            .unwrap();
        }

        offset_ms += 100;
    }

    let records = db.attendance_between(class_start, class_end).await.unwrap();
    assert!(!records.is_empty());

    // The gate must have kept admissions strictly further apart than 10s.
    for pair in records.windows(2) {
        assert!(pair[1].marked_at - pair[0].marked_at > Duration::seconds(10));
    }

    let window = ReportWindow {
        start_at: class_start,
        end_at: class_end,
        interval_seconds: 300,
    };
    let roster = db.registered_names().await.unwrap();
    let rows = build_report(&window, &records, &roster).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name, "Alice");
    // Present for 12 of 30 minutes: slots 0, 1 and 2 of 6.
    assert_eq!(rows[0].marked_slots, 3);
    assert_eq!(rows[0].total_slots, 6);
    assert!((rows[0].percentage - 50.0).abs() < 1e-9);

    assert_eq!(rows[1].name, "Carol");
    assert_eq!(rows[1].marked_slots, 0);
    assert_eq!(rows[1].percentage, 0.0);
}

#[tokio::test]
async fn log_endpoint_ordering_matches_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("rollcall.sqlite3")).unwrap();
    let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

    for (name, offset) in [("Alice", 0), ("Bob", 5), ("Alice", 11)] {
        db.insert_attendance(&AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            marked_at: base + Duration::minutes(offset),
            distance: 0.4,
        })
        .await
        .unwrap();
    }

    let log = db.recent_attendance(10).await.unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].name, "Alice");
    assert_eq!(log[0].marked_at, base + Duration::minutes(11));
    assert_eq!(log[2].marked_at, base);
}
