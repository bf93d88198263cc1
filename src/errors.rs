use reqwest::StatusCode;

use crate::models::Navigation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Conflict,
    Validation,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach the reservation service: {0}")]
    Network(#[from] reqwest::Error),

    #[error("the reservation service failed ({status}): {body}")]
    Server { status: StatusCode, body: String },

    #[error("the reservation service rejected the request ({status}): {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("that time slot is no longer available, please pick a different one")]
    SlotUnavailable,

    #[error("the reservation could not be completed: {0}")]
    Conflict(String),

    #[error("you already booked this slot a moment ago")]
    DuplicateBooking,

    #[error("your hold on this slot expired, please pick the slot again")]
    LockExpired,

    #[error("invalid reservation details: {0}")]
    Validation(String),

    #[error("a reservation is already being submitted")]
    SubmissionInFlight,

    #[error("no time slot is selected")]
    NoSelection,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("session storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Network(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Internal
                }
            }
            ClientError::Server { status, .. } => {
                if status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Internal
                }
            }
            ClientError::SlotUnavailable
            | ClientError::Conflict(_)
            | ClientError::DuplicateBooking
            | ClientError::LockExpired => ErrorKind::Conflict,
            ClientError::Validation(_)
            | ClientError::NoSelection
            | ClientError::InvalidTimeRange(_)
            | ClientError::SubmissionInFlight => ErrorKind::Validation,
            ClientError::Rejected { .. }
            | ClientError::Config(_)
            | ClientError::Storage(_)
            | ClientError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn navigation(&self) -> Option<Navigation> {
        match self {
            ClientError::SlotUnavailable | ClientError::LockExpired | ClientError::Conflict(_) => {
                Some(Navigation::SlotSelection {
                    message: self.to_string(),
                })
            }
            ClientError::DuplicateBooking => Some(Navigation::ReservationList),
            _ => None,
        }
    }
}
