//! Error type for the account service

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::repositories::{StoreError, UniqueField};

/// Outcomes of account operations that do not produce a user
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Username already registered")]
    UsernameTaken,

    #[error("Email already registered")]
    EmailTaken,

    /// Unknown user and wrong password are deliberately indistinguishable
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid identity assertion")]
    InvalidAssertion,

    /// Federated email already belongs to an account with another sign-in method
    #[error("Account conflict")]
    AccountConflict,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(UniqueField::Username) => AuthError::UsernameTaken,
            StoreError::UniqueViolation(UniqueField::Email) => AuthError::EmailTaken,
            StoreError::UniqueViolation(UniqueField::ExternalIdentity) => {
                AuthError::AccountConflict
            }
            StoreError::Database(e) => AuthError::Database(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AuthError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AuthError::UsernameTaken => (
                StatusCode::BAD_REQUEST,
                "Username already registered".to_string(),
            ),
            AuthError::EmailTaken => (
                StatusCode::BAD_REQUEST,
                "Email already registered".to_string(),
            ),
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Incorrect username or password".to_string(),
            ),
            AuthError::InvalidAssertion => (
                StatusCode::UNAUTHORIZED,
                "Invalid identity credential".to_string(),
            ),
            AuthError::AccountConflict => (
                StatusCode::BAD_REQUEST,
                "Email already registered with a different sign-in method".to_string(),
            ),
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Could not validate credentials".to_string(),
            ),
            AuthError::Database(e) => {
                error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AuthError::Internal(e) => {
                error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        let mut response = (status, body).into_response();
        if matches!(self, AuthError::InvalidCredentials | AuthError::Unauthorized) {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Type alias for account service results
pub type AuthResult<T> = Result<T, AuthError>;
