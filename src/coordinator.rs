//! Booking coordinator: drives one booking or cancellation to a consistent end state
use crate::appointment::{Appointment, AppointmentStatus, BookingChannel};
use crate::audit::{AuditEntry, AuditLogger};
use crate::availability;
use crate::clock::{Clock, SystemClock};
use crate::config::BookingConfig;
use crate::donor::DonorEligibilitySnapshot;
use crate::error::{BookingError, ErrorCode};
use crate::session::{ActorType, SessionContext};
use crate::slot::{SlotAdjustment, SlotSnapshot};
use crate::store::{AppointmentQuery, BookingStore, with_timeout};
use crate::types::TimeStamp;
use crate::utils;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Where a booking attempt currently is. Every attempt ends in `Success` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStage {
    Selecting,
    ValidatingSlot,
    CheckingEligibility,
    CreatingAppointment,
    ReservingSlot,
    Verifying,
    Success,
    Failed(ErrorCode),
}

impl BookingStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed(_))
    }
}

impl fmt::Display for BookingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selecting => f.write_str("SELECTING"),
            Self::ValidatingSlot => f.write_str("VALIDATING_SLOT"),
            Self::CheckingEligibility => f.write_str("CHECKING_ELIGIBILITY"),
            Self::CreatingAppointment => f.write_str("CREATING_APPOINTMENT"),
            Self::ReservingSlot => f.write_str("RESERVING_SLOT"),
            Self::Verifying => f.write_str("VERIFYING"),
            Self::Success => f.write_str("SUCCESS"),
            Self::Failed(code) => write!(f, "FAILED({code})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub donor_hash_id: String,
    pub slot: SlotSnapshot,
    pub channel: BookingChannel,
}

impl BookingRequest {
    pub fn new(donor_hash_id: &str, slot: SlotSnapshot, channel: BookingChannel) -> Self {
        Self {
            donor_hash_id: donor_hash_id.to_string(),
            slot,
            channel,
        }
    }

    /// A donor booking for themselves through the online flow
    pub fn for_donor(session: &SessionContext, slot: SlotSnapshot) -> Self {
        Self::new(&session.actor_id, slot, BookingChannel::Online)
    }
}

#[derive(Debug)]
pub struct BookingReceipt {
    pub appointment: Appointment,
    /// Occupancy of the slot right after this reservation
    pub slot_bookings: u32,
    /// Set when the booking went through but could not be read back
    pub warning: Option<BookingError>,
}

#[derive(Debug)]
pub struct CancellationReceipt {
    pub appointment: Appointment,
    /// False when the slot's place could not be given back; the slot then
    /// under-reports its availability until staff correct it
    pub place_released: bool,
}

pub struct BookingCoordinator<S: BookingStore> {
    store: Arc<S>,
    audit: AuditLogger,
    clock: Arc<dyn Clock>,
    config: BookingConfig,
}

impl<S: BookingStore> BookingCoordinator<S> {
    pub fn new(store: Arc<S>, audit: AuditLogger, config: BookingConfig) -> Self {
        Self {
            store,
            audit,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    /// Books the slot in `request` for its donor. Safe to call again after
    /// any failure: each attempt starts by re-validating the slot.
    pub async fn book(
        &self,
        session: &SessionContext,
        request: BookingRequest,
    ) -> Result<BookingReceipt, BookingError> {
        let (progress, _) = watch::channel(BookingStage::Selecting);
        self.book_with_progress(session, request, &progress).await
    }

    /// Same as [`Self::book`], publishing every stage to `progress` so a
    /// caller can show where the attempt is.
    #[tracing::instrument(
        name = "booking",
        skip_all,
        fields(slot_id = %request.slot.slot_id, donor = %request.donor_hash_id)
    )]
    pub async fn book_with_progress(
        &self,
        session: &SessionContext,
        request: BookingRequest,
        progress: &watch::Sender<BookingStage>,
    ) -> Result<BookingReceipt, BookingError> {
        let result = self.run_booking(session, &request, progress).await;

        match &result {
            Ok(receipt) => {
                progress.send_replace(BookingStage::Success);
                tracing::info!(
                    appointment_id = %receipt.appointment.id,
                    slot_bookings = receipt.slot_bookings,
                    verified = receipt.warning.is_none(),
                    "appointment booked"
                );
                let booked = &receipt.appointment;
                self.audit.log(
                    AuditEntry::new(session, "appointment_booked", "appointment")
                        .resource(&booked.id)
                        .details(json!({
                            "slot_id": booked.slot_id,
                            "donor_hash_id": booked.donor_hash_id,
                            "donation_center_id": booked.donation_center_id,
                            "appointment_datetime": booked.appointment_datetime.to_string(),
                            "donation_type": booked.donation_type,
                            "booking_channel": booked.booking_channel,
                            "verified": receipt.warning.is_none(),
                        })),
                );
            }
            Err(err) => {
                progress.send_replace(BookingStage::Failed(err.code()));
                tracing::warn!(code = %err.code(), error = %err, "booking failed");
                self.audit.log(
                    AuditEntry::new(session, "appointment_booking_failed", "donation_slot")
                        .resource(&request.slot.slot_id)
                        .details(json!({
                            "donor_hash_id": request.donor_hash_id,
                            "code": err.code(),
                            "message": err.to_string(),
                        }))
                        .failed(),
                );
            }
        }

        result
    }

    async fn run_booking(
        &self,
        session: &SessionContext,
        request: &BookingRequest,
        progress: &watch::Sender<BookingStage>,
    ) -> Result<BookingReceipt, BookingError> {
        let now = self.clock.now();
        let limit = self.config.store_timeout();

        // donors book for themselves only, staff and system may book for anyone
        if session.actor_type == ActorType::Donor && session.actor_id != request.donor_hash_id {
            return Err(BookingError::NotAuthorized {
                actor_id: session.actor_id.clone(),
            });
        }

        progress.send_replace(BookingStage::ValidatingSlot);
        let slot = availability::validate_slot(
            self.store.as_ref(),
            &request.slot,
            now,
            &self.config.validation_policy(),
        )
        .await?;
        tracing::debug!(
            current_bookings = slot.current_bookings,
            capacity = slot.capacity,
            "slot still bookable"
        );

        progress.send_replace(BookingStage::CheckingEligibility);
        let donor = match with_timeout(limit, self.store.get_donor(&request.donor_hash_id)).await {
            Ok(Some(donor)) if donor.is_active => donor,
            Ok(Some(donor)) => {
                return Err(BookingError::DonorDataFetch(format!(
                    "donor {} is inactive",
                    donor.donor_hash_id
                )));
            }
            Ok(None) => {
                return Err(BookingError::DonorDataFetch(format!(
                    "no donor record for {}",
                    request.donor_hash_id
                )));
            }
            Err(err) => return Err(BookingError::DonorDataFetch(err.to_string())),
        };

        let query = AppointmentQuery::for_donor(&donor.donor_hash_id).of_type(slot.donation_type);
        let history = match with_timeout(limit, self.store.query_appointments(&query)).await {
            Ok(history) => history,
            Err(err) => {
                // accepted risk: the stored donor summary alone still applies
                tracing::warn!(
                    error = %err,
                    "appointment history unavailable, evaluating without it"
                );
                vec![]
            }
        };

        let candidate = slot.slot_datetime.to_datetime_utc();
        DonorEligibilitySnapshot::derive(&donor, &history, candidate, slot.donation_type, now)
            .evaluate(candidate, slot.donation_type)?;

        progress.send_replace(BookingStage::CreatingAppointment);
        // minted up front so a failed insert can still be cleaned up by id
        let appointment_id = utils::new_uuid_to_bech32("appt_")
            .map_err(|e| BookingError::AppointmentCreation(e.to_string()))?;
        let draft = Appointment::scheduled(
            appointment_id.clone(),
            &donor.donor_hash_id,
            &slot,
            request.channel,
            TimeStamp::from(now),
        );
        let appointment = match with_timeout(limit, self.store.insert_appointment(draft)).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                return Err(BookingError::AppointmentCreation(
                    "store accepted the insert but returned no row".into(),
                ));
            }
            Err(err) => {
                self.roll_back(&appointment_id).await;
                return Err(BookingError::from_store("insert appointment", err, |e| {
                    BookingError::AppointmentCreation(e.to_string())
                }));
            }
        };

        progress.send_replace(BookingStage::ReservingSlot);
        let guard = slot.reservation_guard();
        let reserved = with_timeout(
            limit,
            self.store.update_slot_bookings(&guard, SlotAdjustment::Increment),
        )
        .await;
        match reserved {
            Ok(changed) if changed > 0 => {}
            Ok(_) => {
                self.roll_back(&appointment.id).await;
                return Err(BookingError::SlotUpdate(format!(
                    "slot no longer had {} bookings or was closed",
                    guard.expected_bookings
                )));
            }
            Err(err) => {
                self.roll_back(&appointment.id).await;
                return Err(BookingError::SlotUpdate(err.to_string()));
            }
        }

        progress.send_replace(BookingStage::Verifying);
        let warning = match with_timeout(limit, self.store.get_appointment(&appointment.id)).await {
            Ok(Some(_)) => None,
            Ok(None) => Some(BookingError::AppointmentVerification {
                appointment_id: appointment.id.clone(),
            }),
            Err(err) => {
                tracing::warn!(error = %err, "could not read the appointment back");
                Some(BookingError::AppointmentVerification {
                    appointment_id: appointment.id.clone(),
                })
            }
        };

        Ok(BookingReceipt {
            appointment,
            slot_bookings: slot.current_bookings + 1,
            warning,
        })
    }

    // Compensating delete for an appointment whose place was never reserved
    async fn roll_back(&self, appointment_id: &str) {
        match with_timeout(
            self.config.store_timeout(),
            self.store.delete_appointment(appointment_id),
        )
        .await
        {
            Ok(removed) => tracing::info!(appointment_id, removed, "appointment rolled back"),
            Err(err) => tracing::error!(
                appointment_id,
                error = %err,
                "rollback failed, appointment has no reserved place"
            ),
        }
    }

    /// Cancels an active appointment and gives its place back to the slot.
    #[tracing::instrument(name = "cancellation", skip(self, session))]
    pub async fn cancel(
        &self,
        session: &SessionContext,
        appointment_id: &str,
    ) -> Result<CancellationReceipt, BookingError> {
        let result = self.run_cancellation(session, appointment_id).await;

        match &result {
            Ok(receipt) => {
                tracing::info!(place_released = receipt.place_released, "appointment cancelled");
                self.audit.log(
                    AuditEntry::new(session, "appointment_cancelled", "appointment")
                        .resource(appointment_id)
                        .details(json!({ "place_released": receipt.place_released })),
                );
            }
            Err(err) => {
                tracing::warn!(code = %err.code(), error = %err, "cancellation failed");
                self.audit.log(
                    AuditEntry::new(session, "appointment_cancellation_failed", "appointment")
                        .resource(appointment_id)
                        .details(json!({ "code": err.code(), "message": err.to_string() }))
                        .failed(),
                );
            }
        }

        result
    }

    async fn run_cancellation(
        &self,
        session: &SessionContext,
        appointment_id: &str,
    ) -> Result<CancellationReceipt, BookingError> {
        let now = TimeStamp::from(self.clock.now());
        let limit = self.config.store_timeout();
        let storage_failure = |e: crate::error::StoreError| BookingError::Connection(e.to_string());

        let appointment = with_timeout(limit, self.store.get_appointment(appointment_id))
            .await
            .map_err(|e| BookingError::from_store("load appointment", e, storage_failure))?
            .ok_or_else(|| BookingError::AppointmentNotFound(appointment_id.to_string()))?;

        // donors may only cancel their own appointments
        if session.actor_type == ActorType::Donor && session.actor_id != appointment.donor_hash_id {
            return Err(BookingError::AppointmentNotFound(appointment_id.to_string()));
        }

        let next = AppointmentStatus::Cancelled;
        if !appointment.status.can_transition_to(next) {
            return Err(BookingError::InvalidStatusTransition {
                from: appointment.status,
                to: next,
            });
        }

        let changed = with_timeout(
            limit,
            self.store
                .update_appointment_status(appointment_id, appointment.status, next, now),
        )
        .await
        .map_err(|e| BookingError::from_store("cancel appointment", e, storage_failure))?;
        if changed == 0 {
            // moved on since we read it (staff confirmed, completed, or cancelled it)
            return Err(BookingError::InvalidStatusTransition {
                from: appointment.status,
                to: next,
            });
        }

        let place_released = self.release_place(&appointment).await;

        Ok(CancellationReceipt {
            appointment: Appointment {
                status: next,
                updated_at: now,
                ..appointment
            },
            place_released,
        })
    }

    async fn release_place(&self, appointment: &Appointment) -> bool {
        let limit = self.config.store_timeout();

        for attempt in 1..=self.config.cancellation_retries.max(1) {
            let slot = match with_timeout(limit, self.store.get_slot(&appointment.slot_id)).await {
                Ok(Some(slot)) => slot,
                Ok(None) => {
                    tracing::warn!(
                        slot_id = %appointment.slot_id,
                        "slot to release no longer exists"
                    );
                    return false;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "could not load the slot to release");
                    return false;
                }
            };
            if slot.current_bookings == 0 {
                tracing::warn!(slot_id = %slot.id, "slot holds no place for this appointment");
                return false;
            }

            match with_timeout(
                limit,
                self.store
                    .update_slot_bookings(&slot.release_guard(), SlotAdjustment::Decrement),
            )
            .await
            {
                Ok(changed) if changed > 0 => return true,
                Ok(_) => tracing::debug!(attempt, "slot changed while releasing, retrying"),
                Err(err) => {
                    tracing::warn!(error = %err, "could not release the slot place");
                    return false;
                }
            }
        }

        tracing::warn!("gave up releasing the slot place");
        false
    }
}
