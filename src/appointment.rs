//! Appointment rows and the status lifecycle
use crate::slot::DonationSlot;
use crate::types::{DonationType, TimeStamp};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[n(0)]
    Scheduled,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Completed,
    #[n(3)]
    Cancelled,
    #[n(4)]
    NoShow,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum BookingChannel {
    #[n(0)]
    Online,
    #[n(1)]
    Phone,
    #[n(2)]
    WalkIn,
    #[n(3)]
    Staff,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7, `appt_` prefix
    #[n(1)]
    pub donor_hash_id: String,
    #[n(2)]
    pub donation_center_id: String,
    #[n(3)]
    pub appointment_datetime: TimeStamp, // copied from the slot when booked
    #[n(4)]
    pub donation_type: DonationType,
    #[n(5)]
    pub status: AppointmentStatus,
    #[n(6)]
    pub booking_channel: BookingChannel,
    #[n(7)]
    pub confirmation_sent: bool,
    #[n(8)]
    pub reminder_sent: bool,
    #[n(9)]
    pub created_at: TimeStamp,
    #[n(10)]
    pub updated_at: TimeStamp,
    #[n(11)]
    pub slot_id: String, // the slot whose place this appointment holds
}

impl AppointmentStatus {
    /// Still holds a place in its slot
    pub fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Statuses only move forward; terminal statuses never move.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;

        matches!(
            (self, next),
            (Scheduled, Confirmed | Completed | Cancelled | NoShow)
                | (Confirmed, Completed | Cancelled | NoShow)
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Appointment {
    /// A fresh `Scheduled` appointment for `slot`
    pub fn scheduled(
        id: String,
        donor_hash_id: &str,
        slot: &DonationSlot,
        booking_channel: BookingChannel,
        now: TimeStamp,
    ) -> Self {
        Self {
            id,
            donor_hash_id: donor_hash_id.to_string(),
            donation_center_id: slot.center_id.clone(),
            appointment_datetime: slot.slot_datetime,
            donation_type: slot.donation_type,
            status: AppointmentStatus::Scheduled,
            booking_channel,
            confirmation_sent: false,
            reminder_sent: false,
            created_at: now,
            updated_at: now,
            slot_id: slot.id.clone(),
        }
    }
}
