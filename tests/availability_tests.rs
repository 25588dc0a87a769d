//! Slot re-validation against live rows, including storage failures.

mod common;

use chrono::Duration;
use common::{FailureKind, Faults, FaultyStore, days_from_now, now, open_store, seed_slot};
use donation_booking::{
    availability::{ValidationPolicy, validate_slot},
    error::{BookingError, ErrorCode},
    slot::SlotSnapshot,
    types::{DonationType, TimeStamp},
};
use std::sync::Arc;

fn policy() -> ValidationPolicy {
    ValidationPolicy::default()
}

#[tokio::test]
async fn untouched_slot_validates_and_returns_the_fresh_row() {
    let (_dir, store) = open_store();
    let slot = seed_slot(&store, days_from_now(2), DonationType::Blood, 5, 2);

    let fresh = validate_slot(store.as_ref(), &slot.snapshot(), now(), &policy())
        .await
        .unwrap();

    assert_eq!(fresh, slot);
}

#[tokio::test]
async fn unknown_slot_is_not_found() {
    let (_dir, store) = open_store();
    let snapshot = SlotSnapshot {
        slot_id: "slot_missing".into(),
        current_bookings: 0,
    };

    let err = validate_slot(store.as_ref(), &snapshot, now(), &policy())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::SlotNotFound));
}

/// Closed beats full, full beats past, past beats changed
#[tokio::test]
async fn first_failing_check_is_reported() {
    let (_dir, store) = open_store();

    let closed_full_past = seed_slot(&store, days_from_now(-1), DonationType::Blood, 1, 1);
    store.put_slot(&closed_full_past.clone().closed()).unwrap();
    let full_past = seed_slot(&store, days_from_now(-1), DonationType::Blood, 1, 1);
    let past_changed = seed_slot(&store, days_from_now(-1), DonationType::Blood, 3, 1);

    let check = |snapshot: SlotSnapshot| {
        let store = store.clone();
        async move {
            validate_slot(store.as_ref(), &snapshot, now(), &policy())
                .await
                .unwrap_err()
                .code()
        }
    };

    assert_eq!(check(closed_full_past.snapshot()).await, ErrorCode::SlotUnavailable);
    assert_eq!(check(full_past.snapshot()).await, ErrorCode::SlotFull);
    let stale = SlotSnapshot {
        current_bookings: 0,
        ..past_changed.snapshot()
    };
    assert_eq!(check(stale).await, ErrorCode::PastDate);
}

/// Any difference from what the donor saw is rejected, even with room left
#[tokio::test]
async fn occupancy_drift_is_rejected_in_both_directions() {
    let (_dir, store) = open_store();
    let slot = seed_slot(&store, days_from_now(2), DonationType::Plasma, 10, 4);

    for shown in [3, 5] {
        let snapshot = SlotSnapshot {
            current_bookings: shown,
            ..slot.snapshot()
        };
        let err = validate_slot(store.as_ref(), &snapshot, now(), &policy())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BookingError::SlotChanged { expected, actual: 4 } if expected == shown
        ));
    }
}

#[tokio::test]
async fn slot_starting_now_is_in_the_past() {
    let (_dir, store) = open_store();
    let slot = seed_slot(&store, TimeStamp::from(now()), DonationType::Blood, 2, 0);

    let err = validate_slot(store.as_ref(), &slot.snapshot(), now(), &policy())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PastDate);
}

#[tokio::test]
async fn slot_inside_the_lead_time_is_too_soon() {
    let (_dir, store) = open_store();
    let soon = TimeStamp::from(now() + Duration::minutes(30));
    let slot = seed_slot(&store, soon, DonationType::Blood, 2, 0);

    let err = validate_slot(store.as_ref(), &slot.snapshot(), now(), &policy())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotTooSoon { min_lead_minutes: 60 }));

    let relaxed = ValidationPolicy {
        min_lead_time: Duration::minutes(15),
        ..policy()
    };
    assert!(
        validate_slot(store.as_ref(), &slot.snapshot(), now(), &relaxed)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn fetch_failures_map_to_fetch_or_validation_errors() {
    let (_dir, sled) = open_store();
    let slot = seed_slot(&sled, days_from_now(2), DonationType::Blood, 2, 0);

    for (kind, expected) in [
        (FailureKind::Connection, ErrorCode::SlotFetchError),
        (FailureKind::Network, ErrorCode::SlotFetchError),
        (FailureKind::Codec, ErrorCode::ValidationError),
    ] {
        let store = FaultyStore::new(
            sled.clone(),
            Faults {
                slot_fetch: Some(kind),
                ..Faults::default()
            },
        );
        let err = validate_slot(&store, &slot.snapshot(), now(), &policy())
            .await
            .unwrap_err();

        assert_eq!(err.code(), expected, "{kind:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_fails_closed() {
    let (_dir, sled) = open_store();
    let slot = seed_slot(&sled, days_from_now(2), DonationType::Blood, 2, 0);
    let store = Arc::new(FaultyStore::new(
        sled,
        Faults {
            slot_fetch_delay: Some(std::time::Duration::from_secs(30)),
            ..Faults::default()
        },
    ));

    let err = validate_slot(store.as_ref(), &slot.snapshot(), now(), &policy())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ValidationError);
    assert!(err.to_string().contains("timed out after 10s"));
}
