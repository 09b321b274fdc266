//! Persistence ports for the account service

pub mod user;

use async_trait::async_trait;
use common::error::DatabaseError;
use thiserror::Error;

use crate::models::{NewUser, User};

pub use user::UserRepository;

/// Unique fields of the users table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    ExternalIdentity,
}

/// Errors reported by a [`UserStore`]
#[derive(Error, Debug)]
pub enum StoreError {
    /// Insert rejected by a uniqueness constraint
    #[error("Unique constraint violated on {0:?}")]
    UniqueViolation(UniqueField),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lookup-by-unique-field and insert capability over stored users
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_external_identity(&self, subject: &str) -> StoreResult<Option<User>>;

    /// Insert a user; the store assigns `id`, `is_active` and `created_at`
    async fn insert(&self, new_user: &NewUser) -> StoreResult<User>;
}
