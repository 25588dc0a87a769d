//! Calendar projection: raw slot rows folded into per-day availability
use crate::error::StoreError;
use crate::slot::DonationSlot;
use crate::store::{BookingStore, SlotQuery};
use crate::types::DonationType;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeAvailability {
    pub bookable_slots: u32,
    pub open_places: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayAvailability {
    pub blood: TypeAvailability,
    pub plasma: TypeAvailability,
}

impl DayAvailability {
    pub fn for_type(&self, donation_type: DonationType) -> TypeAvailability {
        match donation_type {
            DonationType::Blood => self.blood,
            DonationType::Plasma => self.plasma,
        }
    }

    fn for_type_mut(&mut self, donation_type: DonationType) -> &mut TypeAvailability {
        match donation_type {
            DonationType::Blood => &mut self.blood,
            DonationType::Plasma => &mut self.plasma,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarProjection {
    pub days: BTreeMap<NaiveDate, DayAvailability>,
    pub rows_fetched: usize,
    /// The fetch hit its row cap, so later availability may be missing
    pub truncated: bool,
}

impl CalendarProjection {
    /// Counts only slots that could be booked at `now`: open, not full and
    /// in the future. Days are UTC dates.
    pub fn from_slots(slots: &[DonationSlot], now: DateTime<Utc>, limit: usize) -> Self {
        let mut days: BTreeMap<NaiveDate, DayAvailability> = BTreeMap::new();

        for slot in slots.iter().filter(|s| s.is_bookable_at(now)) {
            let date = slot.slot_datetime.to_datetime_utc().date_naive();
            let entry = days.entry(date).or_default().for_type_mut(slot.donation_type);
            entry.bookable_slots += 1;
            entry.open_places += slot.remaining();
        }

        Self {
            days,
            rows_fetched: slots.len(),
            truncated: slots.len() >= limit,
        }
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayAvailability> {
        self.days.get(&date)
    }

    pub fn has_availability(&self, date: NaiveDate, donation_type: DonationType) -> bool {
        self.day(date)
            .is_some_and(|d| d.for_type(donation_type).open_places > 0)
    }
}

pub async fn project_calendar<S: BookingStore + ?Sized>(
    store: &S,
    query: &SlotQuery,
    now: DateTime<Utc>,
) -> Result<CalendarProjection, StoreError> {
    let slots = store.query_slots(query).await?;
    let projection = CalendarProjection::from_slots(&slots, now, query.limit);
    if projection.truncated {
        tracing::warn!(
            limit = query.limit,
            "slot query hit its row cap, calendar may be incomplete"
        );
    }

    Ok(projection)
}

/// Slots a donor can pick from, in time order
pub async fn bookable_slots<S: BookingStore + ?Sized>(
    store: &S,
    query: &SlotQuery,
    now: DateTime<Utc>,
) -> Result<Vec<DonationSlot>, StoreError> {
    let slots = store.query_slots(query).await?;
    Ok(slots.into_iter().filter(|s| s.is_bookable_at(now)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeStamp;

    fn slot(day: u32, hour: u32, kind: DonationType, capacity: u32, booked: u32) -> DonationSlot {
        DonationSlot::new(
            "center_a",
            TimeStamp::new_with(2030, 6, day, hour, 0, 0).unwrap(),
            kind,
            capacity,
        )
        .unwrap()
        .with_bookings(booked)
    }

    fn now() -> DateTime<Utc> {
        TimeStamp::new_with(2030, 6, 1, 12, 0, 0).unwrap().to_datetime_utc()
    }

    #[test]
    fn sums_open_places_per_day_and_type() {
        let slots = vec![
            slot(2, 9, DonationType::Blood, 4, 1),
            slot(2, 10, DonationType::Blood, 2, 0),
            slot(2, 11, DonationType::Plasma, 3, 3),
            slot(3, 9, DonationType::Plasma, 2, 1),
        ];

        let projection = CalendarProjection::from_slots(&slots, now(), 100);
        let june_2 = NaiveDate::from_ymd_opt(2030, 6, 2).unwrap();
        let june_3 = NaiveDate::from_ymd_opt(2030, 6, 3).unwrap();

        let day = projection.day(june_2).unwrap();
        assert_eq!(day.blood, TypeAvailability { bookable_slots: 2, open_places: 5 });
        assert_eq!(day.plasma, TypeAvailability::default());
        assert!(projection.has_availability(june_3, DonationType::Plasma));
        assert!(!projection.has_availability(june_3, DonationType::Blood));
        assert!(!projection.truncated);
    }

    #[test]
    fn past_and_closed_slots_are_not_counted() {
        let slots = vec![
            slot(1, 9, DonationType::Blood, 4, 0),
            slot(4, 9, DonationType::Blood, 4, 0).closed(),
        ];

        let projection = CalendarProjection::from_slots(&slots, now(), 100);

        assert!(projection.days.is_empty());
        assert_eq!(projection.rows_fetched, 2);
    }

    #[test]
    fn hitting_the_row_cap_marks_truncation() {
        let slots = vec![
            slot(2, 9, DonationType::Blood, 1, 0),
            slot(2, 10, DonationType::Blood, 1, 0),
        ];

        assert!(CalendarProjection::from_slots(&slots, now(), 2).truncated);
    }
}
