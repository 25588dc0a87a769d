//! Appointment booking for blood and plasma donation centres.
//!
//! A booking re-validates the chosen slot, checks the donor's eligibility,
//! writes the appointment and then reserves the slot place with a
//! compare-and-swap on its occupancy. If the reservation loses, the
//! appointment is deleted again, so a booking either fully lands or leaves
//! nothing behind.

pub mod appointment;
pub mod audit;
pub mod availability;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod donor;
pub mod eligibility;
pub mod error;
pub mod session;
pub mod sled_store;
pub mod slot;
pub mod store;
pub mod types;
pub mod utils;
