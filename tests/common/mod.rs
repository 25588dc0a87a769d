//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use donation_booking::{
    appointment::{Appointment, AppointmentStatus},
    audit::AuditLogger,
    clock::FixedClock,
    config::BookingConfig,
    coordinator::BookingCoordinator,
    donor::DonorRecord,
    error::StoreError,
    sled_store::SledStore,
    slot::{DonationSlot, SlotAdjustment, SlotGuard},
    store::{AppointmentQuery, BookingStore, SlotQuery},
    types::{DonationType, TimeStamp},
};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use tempfile::TempDir;

pub const CENTER: &str = "center_north";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Every scenario runs at this instant
pub fn now() -> DateTime<Utc> {
    TimeStamp::new_with(2030, 1, 10, 8, 0, 0)
        .unwrap()
        .to_datetime_utc()
}

pub fn days_from_now(days: i64) -> TimeStamp {
    TimeStamp::from(now() + Duration::days(days))
}

// Sled holds a file lock per database, so each test gets its own directory.
pub fn open_store() -> (TempDir, Arc<SledStore>) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = SledStore::open(dir.path().join("booking.db")).unwrap();
    (dir, Arc::new(store))
}

pub fn seed_slot(
    store: &SledStore,
    at: TimeStamp,
    kind: DonationType,
    capacity: u32,
    booked: u32,
) -> DonationSlot {
    let slot = DonationSlot::new(CENTER, at, kind, capacity)
        .unwrap()
        .with_bookings(booked);
    store.put_slot(&slot).unwrap();
    slot
}

pub fn seed_donor(store: &SledStore, id: &str) -> DonorRecord {
    let donor = DonorRecord::new(id);
    store.put_donor(&donor).unwrap();
    donor
}

pub fn coordinator<S: BookingStore>(store: Arc<S>) -> BookingCoordinator<S> {
    BookingCoordinator::new(store, AuditLogger::disabled(), BookingConfig::default())
        .with_clock(Arc::new(FixedClock::new(now())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connection,
    Network,
    Codec,
}

impl FailureKind {
    fn to_error(self) -> StoreError {
        match self {
            Self::Connection => StoreError::Connection("connection refused".into()),
            Self::Network => StoreError::Network("connection reset".into()),
            Self::Codec => StoreError::Codec("unexpected end of input".into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub slot_fetch: Option<FailureKind>,
    pub slot_fetch_delay: Option<std::time::Duration>,
    pub donor_fetch: Option<FailureKind>,
    pub history_fetch: Option<FailureKind>,
    pub insert_returns_nothing: bool,
    pub reservation_error: Option<FailureKind>,
    /// Another booker takes a place between validation and reservation
    pub steal_place_before_reserve: bool,
    pub verification_misses: bool,
}

/// Delegates to a real store, failing on the calls `faults` names
pub struct FaultyStore {
    pub inner: Arc<SledStore>,
    faults: Mutex<Faults>,
    // reservations wait here until every racing booker has arrived
    reserve_barrier: Option<Barrier>,
}

impl FaultyStore {
    pub fn new(inner: Arc<SledStore>, faults: Faults) -> Self {
        Self {
            inner,
            faults: Mutex::new(faults),
            reserve_barrier: None,
        }
    }

    /// Holds every increment until `bookers` of them are in flight, so all
    /// of them have passed validation against the same occupancy
    pub fn with_reserve_barrier(mut self, bookers: usize) -> Self {
        self.reserve_barrier = Some(Barrier::new(bookers));
        self
    }

    fn faults(&self) -> Faults {
        *self.faults.lock().unwrap()
    }
}

#[async_trait]
impl BookingStore for FaultyStore {
    async fn get_slot(&self, slot_id: &str) -> Result<Option<DonationSlot>, StoreError> {
        let faults = self.faults();
        if let Some(delay) = faults.slot_fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = faults.slot_fetch {
            return Err(kind.to_error());
        }
        self.inner.get_slot(slot_id).await
    }

    async fn query_slots(&self, query: &SlotQuery) -> Result<Vec<DonationSlot>, StoreError> {
        self.inner.query_slots(query).await
    }

    async fn get_donor(&self, donor_hash_id: &str) -> Result<Option<DonorRecord>, StoreError> {
        if let Some(kind) = self.faults().donor_fetch {
            return Err(kind.to_error());
        }
        self.inner.get_donor(donor_hash_id).await
    }

    async fn query_appointments(
        &self,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, StoreError> {
        if let Some(kind) = self.faults().history_fetch {
            return Err(kind.to_error());
        }
        self.inner.query_appointments(query).await
    }

    async fn get_appointment(&self, id: &str) -> Result<Option<Appointment>, StoreError> {
        if self.faults().verification_misses {
            return Ok(None);
        }
        self.inner.get_appointment(id).await
    }

    async fn insert_appointment(
        &self,
        appointment: Appointment,
    ) -> Result<Option<Appointment>, StoreError> {
        if self.faults().insert_returns_nothing {
            return Ok(None);
        }
        self.inner.insert_appointment(appointment).await
    }

    async fn update_slot_bookings(
        &self,
        guard: &SlotGuard,
        adjustment: SlotAdjustment,
    ) -> Result<u64, StoreError> {
        let faults = self.faults();
        if let Some(kind) = faults.reservation_error {
            return Err(kind.to_error());
        }
        if adjustment == SlotAdjustment::Increment {
            if let Some(barrier) = &self.reserve_barrier {
                barrier.wait().await;
            }
        }
        if faults.steal_place_before_reserve && adjustment == SlotAdjustment::Increment {
            self.faults.lock().unwrap().steal_place_before_reserve = false;
            let rival = SlotGuard {
                slot_id: guard.slot_id.clone(),
                expected_bookings: guard.expected_bookings,
                require_available: true,
            };
            assert_eq!(self.inner.update_slot_bookings(&rival, adjustment).await?, 1);
        }
        self.inner.update_slot_bookings(guard, adjustment).await
    }

    async fn update_appointment_status(
        &self,
        id: &str,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        now: TimeStamp,
    ) -> Result<u64, StoreError> {
        self.inner
            .update_appointment_status(id, expected, next, now)
            .await
    }

    async fn delete_appointment(&self, id: &str) -> Result<u64, StoreError> {
        self.inner.delete_appointment(id).await
    }
}
