//! Donation eligibility rules. Pure, no storage access.
use crate::error::EligibilityError;
use crate::types::DonationType;
use chrono::{DateTime, Datelike, Utc};

/// Whole calendar days from `earlier` to `later`, compared as UTC dates.
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later.date_naive() - earlier.date_naive()).num_days()
}

/// Decides whether a donor may give `donation_type` on `candidate`.
///
/// `donations_this_year` counts completed donations plus scheduled and
/// confirmed appointments of the same type in the candidate's year. The
/// annual cap is checked first, so a capped donor is told about the cap
/// even when the interval would also fail.
pub fn evaluate(
    last_relevant_donation: Option<DateTime<Utc>>,
    donations_this_year: u32,
    candidate: DateTime<Utc>,
    donation_type: DonationType,
) -> Result<(), EligibilityError> {
    if let Some(limit) = donation_type.annual_cap() {
        if donations_this_year >= limit {
            return Err(EligibilityError::MaxDonationsReached {
                donation_type,
                limit,
                year: candidate.year(),
            });
        }
    }

    let Some(last) = last_relevant_donation else {
        return Ok(());
    };

    let minimum = donation_type.min_interval_days();
    let days_since_last = days_between(last, candidate);
    if days_since_last < minimum {
        let days_remaining = minimum - days_since_last;
        return Err(match donation_type {
            DonationType::Blood => EligibilityError::InsufficientInterval { days_remaining },
            DonationType::Plasma => EligibilityError::InsufficientIntervalPlasma { days_remaining },
        });
    }

    Ok(())
}
