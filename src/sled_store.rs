//! sled backed storage: one tree per resource, rows encoded as CBOR
use crate::appointment::{Appointment, AppointmentStatus};
use crate::audit::{AuditEntry, AuditSink};
use crate::donor::DonorRecord;
use crate::error::StoreError;
use crate::slot::{DonationSlot, SlotAdjustment, SlotGuard};
use crate::store::{AppointmentQuery, BookingStore, SlotQuery};
use crate::types::TimeStamp;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

const SLOTS_TREE: &str = "donation_slots";
const APPOINTMENTS_TREE: &str = "appointments";
const DONORS_TREE: &str = "donors";
const AUDIT_TREE: &str = "audit_logs";

pub struct SledStore {
    instance: Arc<sled::Db>,
    slots: sled::Tree,
    appointments: sled::Tree,
    donors: sled::Tree,
    audit: sled::Tree,
}

fn encode_row<T: minicbor::Encode<()>>(row: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(row).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode_row<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, StoreError> {
    minicbor::decode(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, StoreError> {
        Ok(Self {
            slots: instance.open_tree(SLOTS_TREE)?,
            appointments: instance.open_tree(APPOINTMENTS_TREE)?,
            donors: instance.open_tree(DONORS_TREE)?,
            audit: instance.open_tree(AUDIT_TREE)?,
            instance,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::new(Arc::new(db))
    }

    /// Creates or replaces a slot row. Slot management belongs to staff
    /// tooling; this is its write path.
    pub fn put_slot(&self, slot: &DonationSlot) -> Result<(), StoreError> {
        self.slots.insert(slot.id.as_bytes(), encode_row(slot)?)?;
        Ok(())
    }

    pub fn put_donor(&self, donor: &DonorRecord) -> Result<(), StoreError> {
        self.donors
            .insert(donor.donor_hash_id.as_bytes(), encode_row(donor)?)?;
        Ok(())
    }

    pub fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        self.audit
            .iter()
            .map(|row| {
                let (_, bytes) = row?;
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string()))
            })
            .collect()
    }

    pub fn appointment_count(&self) -> usize {
        self.appointments.len()
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for SledStore {
    async fn get_slot(&self, slot_id: &str) -> Result<Option<DonationSlot>, StoreError> {
        self.slots
            .get(slot_id.as_bytes())?
            .map(|bytes| decode_row(&bytes))
            .transpose()
    }

    async fn query_slots(&self, query: &SlotQuery) -> Result<Vec<DonationSlot>, StoreError> {
        let mut found = vec![];
        for row in self.slots.iter() {
            let (_, bytes) = row?;
            let slot: DonationSlot = decode_row(&bytes)?;
            if query.matches(&slot) {
                found.push(slot);
            }
        }
        found.sort_by(|a, b| {
            a.slot_datetime
                .cmp(&b.slot_datetime)
                .then_with(|| a.id.cmp(&b.id))
        });
        found.truncate(query.limit);

        Ok(found)
    }

    async fn get_donor(&self, donor_hash_id: &str) -> Result<Option<DonorRecord>, StoreError> {
        self.donors
            .get(donor_hash_id.as_bytes())?
            .map(|bytes| decode_row(&bytes))
            .transpose()
    }

    async fn query_appointments(
        &self,
        query: &AppointmentQuery,
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut found = vec![];
        for row in self.appointments.iter() {
            let (_, bytes) = row?;
            let appointment: Appointment = decode_row(&bytes)?;
            if query.matches(&appointment) {
                found.push(appointment);
            }
        }
        found.sort_by_key(|a| a.appointment_datetime);

        Ok(found)
    }

    async fn get_appointment(&self, id: &str) -> Result<Option<Appointment>, StoreError> {
        self.appointments
            .get(id.as_bytes())?
            .map(|bytes| decode_row(&bytes))
            .transpose()
    }

    async fn insert_appointment(
        &self,
        appointment: Appointment,
    ) -> Result<Option<Appointment>, StoreError> {
        let encoded = encode_row(&appointment)?;
        // insert only, an existing id is never overwritten
        let swapped = self.appointments.compare_and_swap(
            appointment.id.as_bytes(),
            None::<&[u8]>,
            Some(encoded),
        )?;

        Ok(swapped.ok().map(|()| appointment))
    }

    async fn update_slot_bookings(
        &self,
        guard: &SlotGuard,
        adjustment: SlotAdjustment,
    ) -> Result<u64, StoreError> {
        let key = guard.slot_id.as_bytes();
        loop {
            let Some(current) = self.slots.get(key)? else {
                return Ok(0);
            };
            let mut slot: DonationSlot = decode_row(&current)?;
            if !guard.matches(&slot) {
                return Ok(0);
            }
            let Some(next) = adjustment.apply(slot.current_bookings, slot.capacity) else {
                return Ok(0);
            };
            slot.current_bookings = next;
            slot.updated_at = TimeStamp::now();

            match self
                .slots
                .compare_and_swap(key, Some(&current), Some(encode_row(&slot)?))?
            {
                Ok(()) => return Ok(1),
                // row moved underneath us, re-check the guard against the new value
                Err(_) => continue,
            }
        }
    }

    async fn update_appointment_status(
        &self,
        id: &str,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        now: TimeStamp,
    ) -> Result<u64, StoreError> {
        let key = id.as_bytes();
        loop {
            let Some(current) = self.appointments.get(key)? else {
                return Ok(0);
            };
            let mut appointment: Appointment = decode_row(&current)?;
            if appointment.status != expected {
                return Ok(0);
            }
            appointment.status = next;
            appointment.updated_at = now;

            match self.appointments.compare_and_swap(
                key,
                Some(&current),
                Some(encode_row(&appointment)?),
            )? {
                Ok(()) => return Ok(1),
                Err(_) => continue,
            }
        }
    }

    async fn delete_appointment(&self, id: &str) -> Result<u64, StoreError> {
        Ok(self.appointments.remove(id.as_bytes())?.map_or(0, |_| 1))
    }
}

#[async_trait]
impl AuditSink for SledStore {
    async fn record(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let key = uuid7::uuid7();
        let encoded = serde_json::to_vec(entry).map_err(|e| StoreError::Codec(e.to_string()))?;
        self.audit.insert(key.as_bytes(), encoded)?;
        Ok(())
    }
}
