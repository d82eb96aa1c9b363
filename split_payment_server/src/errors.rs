use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::*;
use split_payment_engine::{CheckoutError, PayoutAccountError, ReconcileError};
use thiserror::Error;

use crate::integrations::EventConversionError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error. {0}")]
    CouldNotDeserializePayload(String),
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("No authenticated user was found in the request.")]
    Unauthenticated,
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Conflict. {0}")]
    Conflict(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("The payment provider returned an error. {0}")]
    UpstreamError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouldNotDeserializePayload(_) => StatusCode::BAD_REQUEST,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<CheckoutError> for ServerError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::ValidationError(_) | CheckoutError::FeeError(_) => Self::ValidationError(e.to_string()),
            CheckoutError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            CheckoutError::Forbidden(_) => Self::InsufficientPermissions(e.to_string()),
            CheckoutError::OrderNotPayable { .. } => Self::Conflict(e.to_string()),
            CheckoutError::ServiceUnavailable(provider) => {
                Self::ServiceUnavailable(format!("Payments with {provider} are not yet available. Please try another method."))
            },
            CheckoutError::UpstreamError(_) => Self::UpstreamError(e.to_string()),
            CheckoutError::DatabaseError(e) => {
                error!("💻️ Database error during checkout. {e}");
                Self::BackendError("Database error".to_string())
            },
        }
    }
}

impl From<PayoutAccountError> for ServerError {
    fn from(e: PayoutAccountError) -> Self {
        match e {
            PayoutAccountError::NotAMaker(_) => Self::InsufficientPermissions(e.to_string()),
            PayoutAccountError::MakerNotFound(_) | PayoutAccountError::NoPayoutAccount => {
                Self::NoRecordFound(e.to_string())
            },
            PayoutAccountError::ServiceUnavailable(_) => Self::ServiceUnavailable(e.to_string()),
            PayoutAccountError::UpstreamError(_) => Self::UpstreamError(e.to_string()),
            PayoutAccountError::DatabaseError(e) => {
                error!("💻️ Database error handling payout account request. {e}");
                Self::BackendError("Database error".to_string())
            },
        }
    }
}

impl From<ReconcileError> for ServerError {
    fn from(e: ReconcileError) -> Self {
        // Only infrastructure failures reach this point, and the provider should retry them
        error!("💻️ Could not reconcile webhook. {e}");
        Self::BackendError(e.to_string())
    }
}

impl From<EventConversionError> for ServerError {
    fn from(e: EventConversionError) -> Self {
        Self::CouldNotDeserializePayload(e.to_string())
    }
}
