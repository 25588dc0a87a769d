//! Re-checks a previously selected slot against its live row
use crate::error::{BookingError, StoreError};
use crate::slot::{DonationSlot, SlotSnapshot};
use crate::store::BookingStore;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub fetch_timeout: Duration,
    pub min_lead_time: chrono::Duration,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            min_lead_time: chrono::Duration::hours(1),
        }
    }
}

/// Fetches a fresh copy of the slot behind `snapshot` and decides whether it
/// can still be booked. Checks run in a fixed order and the first failure
/// is the one reported:
///
/// 1. the slot exists
/// 2. it is open
/// 3. it has room
/// 4. it is in the future
/// 5. its occupancy is exactly what the donor saw
/// 6. it starts at least `min_lead_time` from now
///
/// A fetch that outlives `fetch_timeout` fails closed with `VALIDATION_ERROR`.
/// On success the fresh row is returned; its `current_bookings` is the value
/// the reservation must compare against.
pub async fn validate_slot<S: BookingStore + ?Sized>(
    store: &S,
    snapshot: &SlotSnapshot,
    now: DateTime<Utc>,
    policy: &ValidationPolicy,
) -> Result<DonationSlot, BookingError> {
    let lookup = store.get_slot(&snapshot.slot_id);
    let fetched = match tokio::time::timeout(policy.fetch_timeout, lookup).await {
        Err(_) => {
            return Err(BookingError::Validation(format!(
                "slot lookup timed out after {}s",
                policy.fetch_timeout.as_secs()
            )));
        }
        Ok(Err(StoreError::Codec(msg))) => return Err(BookingError::Validation(msg)),
        Ok(Err(err)) => return Err(BookingError::SlotFetch(err)),
        Ok(Ok(slot)) => slot,
    };

    let Some(slot) = fetched else {
        return Err(BookingError::SlotNotFound);
    };
    if !slot.is_available {
        return Err(BookingError::SlotUnavailable);
    }
    if slot.is_full() {
        return Err(BookingError::SlotFull);
    }

    let starts_at = slot.slot_datetime.to_datetime_utc();
    if starts_at <= now {
        return Err(BookingError::PastDate);
    }
    // any movement at all invalidates what the donor was shown
    if slot.current_bookings != snapshot.current_bookings {
        return Err(BookingError::SlotChanged {
            expected: snapshot.current_bookings,
            actual: slot.current_bookings,
        });
    }
    if starts_at - now < policy.min_lead_time {
        return Err(BookingError::SlotTooSoon {
            min_lead_minutes: policy.min_lead_time.num_minutes(),
        });
    }

    Ok(slot)
}
