//! Donation slots and the guard used to reserve them
use crate::types::{DonationType, TimeStamp};
use crate::utils;
use chrono::{DateTime, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct DonationSlot {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7, `slot_` prefix
    #[n(1)]
    pub center_id: String,
    #[n(2)]
    pub slot_datetime: TimeStamp,
    #[n(3)]
    pub donation_type: DonationType,
    #[n(4)]
    pub capacity: u32,
    #[n(5)]
    pub current_bookings: u32, // never above capacity
    #[n(6)]
    pub is_available: bool,
    #[n(7)]
    pub created_at: TimeStamp,
    #[n(8)]
    pub updated_at: TimeStamp,
}

/// What the donor saw when they picked the slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub slot_id: String,
    pub current_bookings: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAdjustment {
    Increment,
    Decrement,
}

/// Compare-and-swap predicate for an occupancy change. The update only lands
/// when the stored row still has `expected_bookings` (and is open, when
/// `require_available` is set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGuard {
    pub slot_id: String,
    pub expected_bookings: u32,
    pub require_available: bool,
}

impl DonationSlot {
    pub fn new(
        center_id: &str,
        slot_datetime: TimeStamp,
        donation_type: DonationType,
        capacity: u32,
    ) -> anyhow::Result<Self> {
        if capacity == 0 {
            return Err(anyhow::anyhow!("slot capacity must be positive"));
        }
        let now = TimeStamp::now();

        Ok(Self {
            id: utils::new_uuid_to_bech32("slot_")?,
            center_id: center_id.to_string(),
            slot_datetime,
            donation_type,
            capacity,
            current_bookings: 0,
            is_available: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_bookings(mut self, current_bookings: u32) -> Self {
        self.current_bookings = current_bookings.min(self.capacity);
        self
    }

    pub fn closed(mut self) -> Self {
        self.is_available = false;
        self
    }

    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.current_bookings)
    }

    pub fn is_full(&self) -> bool {
        self.current_bookings >= self.capacity
    }

    pub fn is_bookable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_available && !self.is_full() && self.slot_datetime.to_datetime_utc() > now
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            slot_id: self.id.clone(),
            current_bookings: self.current_bookings,
        }
    }

    /// Guard for reserving a place in this copy of the slot
    pub fn reservation_guard(&self) -> SlotGuard {
        SlotGuard {
            slot_id: self.id.clone(),
            expected_bookings: self.current_bookings,
            require_available: true,
        }
    }

    /// Guard for giving a place back; closed slots still release places
    pub fn release_guard(&self) -> SlotGuard {
        SlotGuard {
            slot_id: self.id.clone(),
            expected_bookings: self.current_bookings,
            require_available: false,
        }
    }
}

impl SlotAdjustment {
    /// New occupancy, or `None` when the change would leave `0..=capacity`
    pub fn apply(self, current: u32, capacity: u32) -> Option<u32> {
        match self {
            Self::Increment if current < capacity => Some(current + 1),
            Self::Decrement if current > 0 => Some(current - 1),
            _ => None,
        }
    }
}

impl SlotGuard {
    pub fn matches(&self, slot: &DonationSlot) -> bool {
        slot.id == self.slot_id
            && slot.current_bookings == self.expected_bookings
            && (!self.require_available || slot.is_available)
    }
}
