use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use soko_engine::traits::{
    AccountError,
    AuthApiError,
    DisputeError,
    OrderFlowError,
    PayoutError,
    TransferGatewayError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error")]
    CouldNotDeserializePayload,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("You must be logged in to do that. {0}")]
    Unauthenticated(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("CSRF token missing or mismatched")]
    CsrfCheckFailed,
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Order error. {0}")]
    OrderError(#[from] OrderFlowError),
    #[error("Dispute error. {0}")]
    DisputeError(#[from] DisputeError),
    #[error("Payout error. {0}")]
    PayoutError(#[from] PayoutError),
    #[error("Account error. {0}")]
    AccountError(#[from] AccountError),
    #[error("Authentication error. {0}")]
    AuthError(#[from] AuthApiError),
    #[error("Transfer provider error. {0}")]
    GatewayError(#[from] TransferGatewayError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouldNotDeserializePayload => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::CsrfCheckFailed => StatusCode::FORBIDDEN,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::OrderError(e) => order_error_status(e),
            Self::DisputeError(e) => dispute_error_status(e),
            Self::PayoutError(e) => payout_error_status(e),
            Self::AccountError(e) => account_error_status(e),
            Self::AuthError(e) => auth_error_status(e),
            Self::GatewayError(e) => match e {
                TransferGatewayError::Rejected(_) => StatusCode::BAD_REQUEST,
                TransferGatewayError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        // 5xx bodies are opaque; the detail goes to the log only.
        let message = if self.status_code().is_server_error() {
            error!("💻️ Internal error served as 500: {self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": message }).to_string())
    }
}

fn order_error_status(e: &OrderFlowError) -> StatusCode {
    match e {
        OrderFlowError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        OrderFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderFlowError::OrderItemNotFound(_) => StatusCode::NOT_FOUND,
        OrderFlowError::NotYourOrder => StatusCode::FORBIDDEN,
        OrderFlowError::DuplicateOrder(_) |
        OrderFlowError::EmptyOrder |
        OrderFlowError::InvalidItem |
        OrderFlowError::InvalidStatusChange(_) => StatusCode::BAD_REQUEST,
    }
}

fn dispute_error_status(e: &DisputeError) -> StatusCode {
    match e {
        DisputeError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DisputeError::OrderNotFound(_) | DisputeError::DisputeNotFound(_) => StatusCode::NOT_FOUND,
        DisputeError::NotYourOrder | DisputeError::NotAParty => StatusCode::FORBIDDEN,
        DisputeError::OrderNotDisputable { .. } |
        DisputeError::WindowClosed(_) |
        DisputeError::AlreadyDisputed(_) |
        DisputeError::ItemRequired |
        DisputeError::ItemNotInOrder { .. } |
        DisputeError::ThreadClosed(_) |
        DisputeError::AlreadySettled(_) |
        DisputeError::EmptyReason |
        DisputeError::EmptyMessage => StatusCode::BAD_REQUEST,
    }
}

fn payout_error_status(e: &PayoutError) -> StatusCode {
    match e {
        PayoutError::DatabaseError(_) | PayoutError::ProviderUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PayoutError::AccountError(inner) => account_error_status(inner),
        PayoutError::PayoutNotFound(_) | PayoutError::ReferenceNotFound(_) => StatusCode::NOT_FOUND,
        PayoutError::PhoneNotVerified | PayoutError::NotYourPayout(_) => StatusCode::FORBIDDEN,
        PayoutError::InvalidAmount |
        PayoutError::InsufficientFunds { .. } |
        PayoutError::NoPayoutDestination |
        PayoutError::InvalidStatusChange { .. } => StatusCode::BAD_REQUEST,
    }
}

fn account_error_status(e: &AccountError) -> StatusCode {
    match e {
        AccountError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AccountError::UserNotFound(_) | AccountError::AccountNotFound(_) | AccountError::NotificationNotFound(_) => {
            StatusCode::NOT_FOUND
        },
        AccountError::NotYourAccount(_) => StatusCode::FORBIDDEN,
        AccountError::DuplicateAccount |
        AccountError::InvalidAccountNumber(_) |
        AccountError::InvalidPhoneNumber(_) => StatusCode::BAD_REQUEST,
    }
}

fn auth_error_status(e: &AuthApiError) -> StatusCode {
    match e {
        AuthApiError::DatabaseError(_) | AuthApiError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AuthApiError::InvalidCredentials | AuthApiError::InvalidSession => StatusCode::UNAUTHORIZED,
        AuthApiError::UserNotFound(_) => StatusCode::NOT_FOUND,
        AuthApiError::OtpCooldown(_) | AuthApiError::OtpAttemptsExhausted => StatusCode::TOO_MANY_REQUESTS,
        AuthApiError::ActionTokenInvalid => StatusCode::FORBIDDEN,
        AuthApiError::DuplicateEmail |
        AuthApiError::OtpNotFound |
        AuthApiError::OtpExpired |
        AuthApiError::OtpIncorrect(_) |
        AuthApiError::NoPhoneNumber => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
mod test {
    use actix_web::{error::ResponseError, http::StatusCode};
    use soko_common::Cents;
    use soko_engine::traits::{AuthApiError, DisputeError, PayoutError};

    use super::ServerError;

    #[test]
    fn session_failures_are_401() {
        let err = ServerError::from(AuthApiError::InvalidSession);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn otp_cooldown_is_429_but_a_wrong_code_is_400() {
        assert_eq!(ServerError::from(AuthApiError::OtpCooldown(42)).status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ServerError::from(AuthApiError::OtpAttemptsExhausted).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ServerError::from(AuthApiError::OtpIncorrect(3)).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn business_rule_violations_are_400() {
        let err = ServerError::from(PayoutError::InsufficientFunds {
            requested: Cents::from(50_001),
            available: Cents::from(50_000),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err = ServerError::from(DisputeError::WindowClosed("ORD-1-abc".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_get_an_opaque_body() {
        let err = ServerError::BackendError("connection pool exhausted".to_string());
        let res = err.error_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
