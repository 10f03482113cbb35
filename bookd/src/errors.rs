use crate::db::errors::DbError;
use crate::db::models::bookings::BookingStatus;
use crate::types::{BookingId, UserId};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or malformed input
    #[error("{message}")]
    Validation { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// No actor identity on the request, or one the directory does not know
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Actor is known but not permitted to perform the operation
    #[error("Not allowed to {action}")]
    Unauthorized { action: String },

    /// Actor's identity verification is not approved
    #[error("User {user_id} has not completed identity verification")]
    NotVerified { user_id: UserId },

    /// Target status is not a direct successor of the current one, or the booking moved on
    #[error("Cannot transition booking from {from} to {to}; allowed: {}", describe_allowed(.allowed))]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
        allowed: Vec<BookingStatus>,
    },

    /// Provider has no acceptance slots left in the current period
    #[error("Provider {provider_id} has reached the limit of {max_jobs} accepted jobs")]
    QuotaExceeded { provider_id: UserId, max_jobs: i32 },

    /// A quota reservation could not be compensated after the transition failed
    #[error("Quota reservation for provider {provider_id} could not be released after booking {booking_id} failed to persist")]
    QuotaInconsistency { provider_id: UserId, booking_id: BookingId },

    /// Storage error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn describe_allowed(allowed: &[BookingStatus]) -> String {
    if allowed.is_empty() {
        "none (terminal)".to_string()
    } else {
        allowed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code, e.g. `quota_exceeded`
    pub code: String,
    pub message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Unauthorized { .. } | Error::NotVerified { .. } => StatusCode::FORBIDDEN,
            Error::InvalidTransition { .. } | Error::QuotaExceeded { .. } => StatusCode::CONFLICT,
            Error::QuotaInconsistency { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Corrupt { .. } | DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation_error",
            Error::NotFound { .. } => "not_found",
            Error::Unauthenticated { .. } => "unauthenticated",
            Error::Unauthorized { .. } => "unauthorized",
            Error::NotVerified { .. } => "not_verified",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::Database(DbError::NotFound) => "not_found",
            Error::Database(DbError::UniqueViolation { .. }) => "conflict",
            Error::Database(DbError::ForeignKeyViolation { .. }) => "invalid_reference",
            Error::QuotaInconsistency { .. } | Error::Database(_) | Error::Other(_) => "internal_error",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Unauthorized { action } => format!("You are not allowed to {action}"),
            Error::NotVerified { .. } => "Identity verification must be approved before continuing".to_string(),
            Error::InvalidTransition { .. } | Error::QuotaExceeded { .. } => self.to_string(),
            Error::QuotaInconsistency { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::Corrupt { .. } | DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::QuotaInconsistency { .. } | Error::Database(DbError::Other(_) | DbError::Corrupt { .. }) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::InvalidTransition { .. } | Error::QuotaExceeded { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::Unauthorized { .. } | Error::NotVerified { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Validation { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
