//! Error types for storage, eligibility and the booking protocol
use crate::appointment::AppointmentStatus;
use crate::types::DonationType;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("failed to encode or decode a row: {0}")]
    Codec(String),
    #[error("storage call did not complete within {0:?}")]
    Timeout(Duration),
    #[error("could not connect to storage: {0}")]
    Connection(String),
    #[error("network error while talking to storage: {0}")]
    Network(String),
}

/// Why a donor may not book the candidate date. Each variant renders its own
/// canonical message, so callers never have to make one up.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EligibilityError {
    #[error("You must wait {days_remaining} more day(s) before donating blood again")]
    InsufficientInterval { days_remaining: i64 },
    #[error("You must wait {days_remaining} more day(s) before donating plasma again")]
    InsufficientIntervalPlasma { days_remaining: i64 },
    #[error("The limit of {limit} {donation_type} donations in {year} has been reached")]
    MaxDonationsReached {
        donation_type: DonationType,
        limit: u32,
        year: i32,
    },
}

impl EligibilityError {
    pub fn days_remaining(&self) -> Option<i64> {
        match self {
            Self::InsufficientInterval { days_remaining }
            | Self::InsufficientIntervalPlasma { days_remaining } => Some(*days_remaining),
            Self::MaxDonationsReached { .. } => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InsufficientInterval { .. } => ErrorCode::InsufficientInterval,
            Self::InsufficientIntervalPlasma { .. } => ErrorCode::InsufficientIntervalPlasma,
            Self::MaxDonationsReached { .. } => ErrorCode::MaxDonationsReached,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// Where a failure came from, which decides the recovery the user is offered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Re-select a slot after refreshing
    Availability,
    /// Pick a later date or another donation type
    Eligibility,
    /// Retry, and contact support if it keeps happening
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SlotNotFound,
    SlotUnavailable,
    SlotFull,
    SlotChanged,
    SlotTooSoon,
    PastDate,
    InsufficientInterval,
    InsufficientIntervalPlasma,
    MaxDonationsReached,
    SlotFetchError,
    ValidationError,
    DonorDataFetchError,
    SlotUpdateFailed,
    AppointmentCreationFailed,
    AppointmentVerificationFailed,
    AppointmentNotFound,
    InvalidStatusTransition,
    NotAuthorized,
    ConnectionFailed,
    NetworkError,
    TimeoutError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SlotNotFound => "SLOT_NOT_FOUND",
            Self::SlotUnavailable => "SLOT_UNAVAILABLE",
            Self::SlotFull => "SLOT_FULL",
            Self::SlotChanged => "SLOT_CHANGED",
            Self::SlotTooSoon => "SLOT_TOO_SOON",
            Self::PastDate => "PAST_DATE",
            Self::InsufficientInterval => "INSUFFICIENT_INTERVAL",
            Self::InsufficientIntervalPlasma => "INSUFFICIENT_INTERVAL_PLASMA",
            Self::MaxDonationsReached => "MAX_DONATIONS_REACHED",
            Self::SlotFetchError => "SLOT_FETCH_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::DonorDataFetchError => "DONOR_DATA_FETCH_ERROR",
            Self::SlotUpdateFailed => "SLOT_UPDATE_FAILED",
            Self::AppointmentCreationFailed => "APPOINTMENT_CREATION_FAILED",
            Self::AppointmentVerificationFailed => "APPOINTMENT_VERIFICATION_FAILED",
            Self::AppointmentNotFound => "APPOINTMENT_NOT_FOUND",
            Self::InvalidStatusTransition => "INVALID_STATUS_TRANSITION",
            Self::NotAuthorized => "NOT_AUTHORIZED",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::TimeoutError => "TIMEOUT_ERROR",
        }
    }

    pub const fn severity(self) -> Severity {
        match self {
            Self::SlotNotFound
            | Self::SlotUnavailable
            | Self::SlotFull
            | Self::SlotChanged
            | Self::SlotTooSoon
            | Self::PastDate
            | Self::InsufficientInterval
            | Self::InsufficientIntervalPlasma
            | Self::MaxDonationsReached
            | Self::AppointmentVerificationFailed
            | Self::AppointmentNotFound
            | Self::InvalidStatusTransition
            | Self::NotAuthorized => Severity::Warning,
            Self::AppointmentCreationFailed => Severity::Critical,
            Self::SlotFetchError
            | Self::ValidationError
            | Self::DonorDataFetchError
            | Self::SlotUpdateFailed
            | Self::ConnectionFailed
            | Self::NetworkError
            | Self::TimeoutError => Severity::Error,
        }
    }

    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::SlotNotFound
            | Self::SlotUnavailable
            | Self::SlotFull
            | Self::SlotChanged
            | Self::SlotTooSoon
            | Self::PastDate => ErrorCategory::Availability,
            Self::InsufficientInterval
            | Self::InsufficientIntervalPlasma
            | Self::MaxDonationsReached => ErrorCategory::Eligibility,
            _ => ErrorCategory::System,
        }
    }

    pub const fn suggestion(self) -> &'static str {
        match self {
            Self::SlotNotFound | Self::SlotUnavailable | Self::SlotFull | Self::SlotChanged => {
                "Refresh the calendar and choose another slot."
            }
            Self::SlotTooSoon => "Choose a slot that starts at least an hour from now.",
            Self::PastDate => "Choose a slot in the future.",
            Self::InsufficientInterval | Self::InsufficientIntervalPlasma => {
                "Choose a later date once the waiting period has passed."
            }
            Self::MaxDonationsReached => {
                "Choose a date next year or a different donation type."
            }
            Self::AppointmentVerificationFailed => {
                "Check your appointments list before booking again."
            }
            Self::AppointmentNotFound => "Refresh your appointments list.",
            Self::InvalidStatusTransition => "This appointment can no longer be changed.",
            Self::NotAuthorized => "Sign in as the donor you are booking for.",
            Self::SlotUpdateFailed => "Someone else booked this slot first. Refresh and try again.",
            Self::SlotFetchError
            | Self::ValidationError
            | Self::DonorDataFetchError
            | Self::AppointmentCreationFailed
            | Self::ConnectionFailed
            | Self::NetworkError
            | Self::TimeoutError => "Check your connection and try again in a moment.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BookingError {
    #[error("The selected slot no longer exists")]
    SlotNotFound,
    #[error("The selected slot is no longer available")]
    SlotUnavailable,
    #[error("The selected slot is fully booked")]
    SlotFull,
    #[error("The selected slot is in the past")]
    PastDate,
    #[error("The selected slot changed since it was shown ({expected} booked then, {actual} now)")]
    SlotChanged { expected: u32, actual: u32 },
    #[error("The selected slot starts in less than {min_lead_minutes} minutes")]
    SlotTooSoon { min_lead_minutes: i64 },
    #[error("Could not load the selected slot: {0}")]
    SlotFetch(#[source] StoreError),
    #[error("Slot validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Ineligible(#[from] EligibilityError),
    #[error("Could not load donor data: {0}")]
    DonorDataFetch(String),
    #[error("The appointment could not be created: {0}")]
    AppointmentCreation(String),
    #[error("The slot could not be reserved: {0}")]
    SlotUpdate(String),
    #[error("Appointment {appointment_id} was created but could not be confirmed")]
    AppointmentVerification { appointment_id: String },
    #[error("Appointment {0} does not exist")]
    AppointmentNotFound(String),
    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("{actor_id} may not book for another donor")]
    NotAuthorized { actor_id: String },
    #[error("Could not reach the booking service: {0}")]
    Connection(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{step} did not complete within {limit:?}")]
    Timeout { step: &'static str, limit: Duration },
}

impl BookingError {
    /// Maps transport-level store failures to their own codes and hands
    /// everything else to `otherwise`.
    pub fn from_store(
        step: &'static str,
        err: StoreError,
        otherwise: impl FnOnce(StoreError) -> BookingError,
    ) -> Self {
        match err {
            StoreError::Timeout(limit) => Self::Timeout { step, limit },
            StoreError::Connection(msg) => Self::Connection(msg),
            StoreError::Network(msg) => Self::Network(msg),
            other => otherwise(other),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SlotNotFound => ErrorCode::SlotNotFound,
            Self::SlotUnavailable => ErrorCode::SlotUnavailable,
            Self::SlotFull => ErrorCode::SlotFull,
            Self::PastDate => ErrorCode::PastDate,
            Self::SlotChanged { .. } => ErrorCode::SlotChanged,
            Self::SlotTooSoon { .. } => ErrorCode::SlotTooSoon,
            Self::SlotFetch(_) => ErrorCode::SlotFetchError,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Ineligible(inner) => inner.code(),
            Self::DonorDataFetch(_) => ErrorCode::DonorDataFetchError,
            Self::AppointmentCreation(_) => ErrorCode::AppointmentCreationFailed,
            Self::SlotUpdate(_) => ErrorCode::SlotUpdateFailed,
            Self::AppointmentVerification { .. } => ErrorCode::AppointmentVerificationFailed,
            Self::AppointmentNotFound(_) => ErrorCode::AppointmentNotFound,
            Self::InvalidStatusTransition { .. } => ErrorCode::InvalidStatusTransition,
            Self::NotAuthorized { .. } => ErrorCode::NotAuthorized,
            Self::Connection(_) => ErrorCode::ConnectionFailed,
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Timeout { .. } => ErrorCode::TimeoutError,
        }
    }

    pub fn severity(&self) -> Severity {
        self.code().severity()
    }

    /// Renders the error for the booking screen. The support contact is only
    /// attached to `Error` and `Critical` failures.
    pub fn user_facing(&self, support_contact: &str) -> UserFacingError {
        let code = self.code();
        let severity = code.severity();
        let contact = (severity >= Severity::Error).then(|| support_contact.to_string());

        UserFacingError {
            code,
            category: code.category(),
            message: self.to_string(),
            suggestion: code.suggestion(),
            severity,
            contact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFacingError {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    pub suggestion: &'static str,
    pub severity: Severity,
    pub contact: Option<String>,
}
