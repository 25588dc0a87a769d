//! Donor rows and the per-booking eligibility snapshot derived from them
use crate::appointment::{Appointment, AppointmentStatus};
use crate::error::EligibilityError;
use crate::eligibility;
use crate::types::{DonationType, TimeStamp};
use chrono::{DateTime, Datelike, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct DonorRecord {
    #[n(0)]
    pub donor_hash_id: String, // see utils::donor_hash_id, never raw identity
    #[n(1)]
    pub last_donation_date: Option<TimeStamp>,
    #[n(2)]
    pub total_donations_this_year: u32, // completed donations only
    #[n(3)]
    pub is_active: bool,
}

impl DonorRecord {
    pub fn new(donor_hash_id: &str) -> Self {
        Self {
            donor_hash_id: donor_hash_id.to_string(),
            last_donation_date: None,
            total_donations_this_year: 0,
            is_active: true,
        }
    }

    pub fn with_history(
        mut self,
        last_donation_date: Option<TimeStamp>,
        total_this_year: u32,
    ) -> Self {
        self.last_donation_date = last_donation_date;
        self.total_donations_this_year = total_this_year;
        self
    }
}

/// Inputs to the eligibility rules for one candidate booking. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DonorEligibilitySnapshot {
    pub last_relevant_donation: Option<DateTime<Utc>>,
    pub donations_this_year: u32,
}

// cancelled and missed appointments never became donations
fn counts_towards_interval(status: AppointmentStatus) -> bool {
    matches!(
        status,
        AppointmentStatus::Scheduled | AppointmentStatus::Confirmed | AppointmentStatus::Completed
    )
}

impl DonorEligibilitySnapshot {
    /// Combines the donor's stored summary with their appointments of the
    /// same type that fall before `candidate`.
    ///
    /// The stored completed count describes the year of `now`, so it is only
    /// applied when the candidate falls in that same year. Completed
    /// appointments are already part of it; only scheduled and confirmed
    /// ones are added on top.
    pub fn derive(
        donor: &DonorRecord,
        appointments: &[Appointment],
        candidate: DateTime<Utc>,
        donation_type: DonationType,
        now: DateTime<Utc>,
    ) -> Self {
        let year = candidate.year();
        let prior: Vec<&Appointment> = appointments
            .iter()
            .filter(|a| a.donation_type == donation_type)
            .filter(|a| a.appointment_datetime.to_datetime_utc() < candidate)
            .collect();

        let latest_appointment = prior
            .iter()
            .filter(|a| counts_towards_interval(a.status))
            .map(|a| a.appointment_datetime.to_datetime_utc())
            .max();
        let stored_last = donor.last_donation_date.map(|ts| ts.to_datetime_utc());

        let stored_count = if now.year() == year {
            donor.total_donations_this_year
        } else {
            0
        };
        let pending = prior
            .iter()
            .filter(|a| a.status.is_active())
            .filter(|a| a.appointment_datetime.to_datetime_utc().year() == year)
            .count() as u32;

        Self {
            last_relevant_donation: stored_last.max(latest_appointment),
            donations_this_year: stored_count + pending,
        }
    }

    pub fn evaluate(
        &self,
        candidate: DateTime<Utc>,
        donation_type: DonationType,
    ) -> Result<(), EligibilityError> {
        eligibility::evaluate(
            self.last_relevant_donation,
            self.donations_this_year,
            candidate,
            donation_type,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointment::BookingChannel;
    use crate::slot::DonationSlot;

    fn at(y: i32, m: u32, d: u32) -> TimeStamp {
        TimeStamp::new_with(y, m, d, 10, 0, 0).unwrap()
    }

    fn appointment(date: TimeStamp, kind: DonationType, status: AppointmentStatus) -> Appointment {
        let slot = DonationSlot::new("center_a", date, kind, 5).unwrap();
        let mut appt =
            Appointment::scheduled("appt_t".into(), "donor", &slot, BookingChannel::Online, date);
        appt.status = status;
        appt
    }

    #[test]
    fn later_appointment_overrides_stored_date() {
        let donor = DonorRecord::new("donor").with_history(Some(at(2030, 1, 5)), 1);
        let appts = vec![appointment(
            at(2030, 2, 1),
            DonationType::Blood,
            AppointmentStatus::Scheduled,
        )];
        let candidate = at(2030, 6, 1).to_datetime_utc();

        let snap = DonorEligibilitySnapshot::derive(
            &donor,
            &appts,
            candidate,
            DonationType::Blood,
            at(2030, 1, 20).to_datetime_utc(),
        );

        assert_eq!(snap.last_relevant_donation, Some(at(2030, 2, 1).to_datetime_utc()));
        assert_eq!(snap.donations_this_year, 2);
    }

    #[test]
    fn ignores_other_types_later_dates_and_cancelled() {
        let donor = DonorRecord::new("donor");
        let appts = vec![
            appointment(at(2030, 3, 1), DonationType::Plasma, AppointmentStatus::Scheduled),
            appointment(at(2030, 9, 1), DonationType::Blood, AppointmentStatus::Scheduled),
            appointment(at(2030, 2, 1), DonationType::Blood, AppointmentStatus::Cancelled),
        ];

        let snap = DonorEligibilitySnapshot::derive(
            &donor,
            &appts,
            at(2030, 6, 1).to_datetime_utc(),
            DonationType::Blood,
            at(2030, 1, 1).to_datetime_utc(),
        );

        assert_eq!(snap.last_relevant_donation, None);
        assert_eq!(snap.donations_this_year, 0);
    }

    #[test]
    fn stored_count_only_applies_to_the_current_year() {
        let donor = DonorRecord::new("donor").with_history(Some(at(2030, 3, 1)), 4);

        let snap = DonorEligibilitySnapshot::derive(
            &donor,
            &[],
            at(2031, 2, 1).to_datetime_utc(),
            DonationType::Blood,
            at(2030, 11, 1).to_datetime_utc(),
        );

        assert_eq!(snap.donations_this_year, 0);
        assert!(snap.evaluate(at(2031, 2, 1).to_datetime_utc(), DonationType::Blood).is_ok());
    }
}
