//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User entity
///
/// Deliberately not `Serialize`: responses go through [`UserResponse`] so the
/// password hash can never end up in a body.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub external_identity_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// How a new account proves its identity. Every user carries at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Argon2 PHC string of a locally chosen password
    Password(String),
    /// Subject identifier issued by the federated identity provider
    External(String),
}

/// New user creation payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub credential: Credential,
}

impl NewUser {
    /// A locally registered account with an already hashed password
    pub fn local(username: &str, email: &str, password_hash: String) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            credential: Credential::Password(password_hash),
        }
    }

    /// An account provisioned from a federated identity
    pub fn federated(username: &str, email: &str, subject: &str) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            credential: Credential::External(subject.to_string()),
        }
    }

    pub fn password_hash(&self) -> Option<&str> {
        match &self.credential {
            Credential::Password(hash) => Some(hash),
            Credential::External(_) => None,
        }
    }

    pub fn external_identity_id(&self) -> Option<&str> {
        match &self.credential {
            Credential::External(subject) => Some(subject),
            Credential::Password(_) => None,
        }
    }
}

/// Public view of a user returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_active: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
        }
    }
}
