//! Storage capability the booking protocol runs against
use crate::appointment::{Appointment, AppointmentStatus};
use crate::donor::DonorRecord;
use crate::error::StoreError;
use crate::slot::{DonationSlot, SlotAdjustment, SlotGuard};
use crate::types::{DonationType, TimeStamp};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Filtered slot read. Bounds are inclusive; results come back ordered by
/// slot time and capped at `limit` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub center_id: Option<String>,
    pub from: Option<TimeStamp>,
    pub to: Option<TimeStamp>,
    pub donation_type: Option<DonationType>,
    pub limit: usize,
}

impl SlotQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            center_id: None,
            from: None,
            to: None,
            donation_type: None,
            limit,
        }
    }
    pub fn center(mut self, center_id: &str) -> Self {
        self.center_id = Some(center_id.to_string());
        self
    }
    pub fn between(mut self, from: TimeStamp, to: TimeStamp) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }
    pub fn of_type(mut self, donation_type: DonationType) -> Self {
        self.donation_type = Some(donation_type);
        self
    }

    pub fn matches(&self, slot: &DonationSlot) -> bool {
        self.center_id.as_ref().is_none_or(|c| *c == slot.center_id)
            && self.from.is_none_or(|from| slot.slot_datetime >= from)
            && self.to.is_none_or(|to| slot.slot_datetime <= to)
            && self.donation_type.is_none_or(|t| t == slot.donation_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentQuery {
    pub donor_hash_id: String,
    pub donation_type: Option<DonationType>,
}

impl AppointmentQuery {
    pub fn for_donor(donor_hash_id: &str) -> Self {
        Self {
            donor_hash_id: donor_hash_id.to_string(),
            donation_type: None,
        }
    }
    pub fn of_type(mut self, donation_type: DonationType) -> Self {
        self.donation_type = Some(donation_type);
        self
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        appointment.donor_hash_id == self.donor_hash_id
            && self.donation_type.is_none_or(|t| t == appointment.donation_type)
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get_slot(&self, slot_id: &str) -> Result<Option<DonationSlot>, StoreError>;

    async fn query_slots(&self, query: &SlotQuery) -> Result<Vec<DonationSlot>, StoreError>;

    async fn get_donor(&self, donor_hash_id: &str) -> Result<Option<DonorRecord>, StoreError>;

    async fn query_appointments(
        &self,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn get_appointment(&self, id: &str) -> Result<Option<Appointment>, StoreError>;

    /// Returns the stored row, or `None` if the store accepted the write but
    /// handed nothing back.
    async fn insert_appointment(
        &self,
        appointment: Appointment,
    ) -> Result<Option<Appointment>, StoreError>;

    /// Conditional occupancy change. Returns the number of rows changed: 0
    /// when the guard no longer matches or the change would leave
    /// `0..=capacity`.
    async fn update_slot_bookings(
        &self,
        guard: &SlotGuard,
        adjustment: SlotAdjustment,
    ) -> Result<u64, StoreError>;

    /// Moves an appointment from `expected` to `next`. Returns 0 when the
    /// row is gone or no longer has `expected`.
    async fn update_appointment_status(
        &self,
        id: &str,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        now: TimeStamp,
    ) -> Result<u64, StoreError>;

    async fn delete_appointment(&self, id: &str) -> Result<u64, StoreError>;
}

/// Bounds a store call; an expired bound becomes `StoreError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
