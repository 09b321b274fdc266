//! Test doubles for the store and the identity verifier

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    federation::{FederatedIdentity, FederationError, IdentityVerifier},
    jwt::{JwtConfig, JwtService},
    models::{NewUser, User},
    repositories::{StoreError, StoreResult, UniqueField, UserStore},
};

pub const TEST_JWT_SECRET: &str = "test-signing-secret";

pub fn jwt_service() -> JwtService {
    JwtService::new(&JwtConfig {
        secret: TEST_JWT_SECRET.to_string(),
        access_token_expiry: 1800,
    })
}

/// In-memory user store enforcing the same unique constraints as the schema
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<User>>,
    blind_lookups: bool,
}

impl InMemoryUserStore {
    /// Lookups always miss, so only insert-time constraints catch duplicates.
    /// Mimics losing a race against a concurrent request.
    pub fn with_blind_lookups(mut self) -> Self {
        self.blind_lookups = true;
        self
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn deactivate(&self, username: &str) {
        let mut users = self.users.lock().await;
        if let Some(user) = users.iter_mut().find(|u| u.username == username) {
            user.is_active = false;
        }
    }

    async fn find(&self, predicate: impl Fn(&User) -> bool) -> StoreResult<Option<User>> {
        if self.blind_lookups {
            return Ok(None);
        }
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| predicate(*u)).cloned())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.find(|u| u.username == username).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find(|u| u.email == email).await
    }

    async fn find_by_external_identity(&self, subject: &str) -> StoreResult<Option<User>> {
        self.find(|u| u.external_identity_id.as_deref() == Some(subject))
            .await
    }

    async fn insert(&self, new_user: &NewUser) -> StoreResult<User> {
        let mut users = self.users.lock().await;

        if users.iter().any(|u| u.username == new_user.username) {
            return Err(StoreError::UniqueViolation(UniqueField::Username));
        }
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(StoreError::UniqueViolation(UniqueField::Email));
        }
        if let Some(subject) = new_user.external_identity_id() {
            if users
                .iter()
                .any(|u| u.external_identity_id.as_deref() == Some(subject))
            {
                return Err(StoreError::UniqueViolation(UniqueField::ExternalIdentity));
            }
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash().map(str::to_string),
            external_identity_id: new_user.external_identity_id().map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
        };
        users.push(user.clone());

        Ok(user)
    }
}

/// Store where another request provisions the same user just before each
/// first insert lands, so that insert loses on the username constraint
#[derive(Default)]
pub struct RacingUserStore {
    inner: InMemoryUserStore,
    raced: AtomicBool,
}

impl RacingUserStore {
    pub fn inner(&self) -> &InMemoryUserStore {
        &self.inner
    }
}

#[async_trait]
impl UserStore for RacingUserStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.find_by_username(username).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_external_identity(&self, subject: &str) -> StoreResult<Option<User>> {
        self.inner.find_by_external_identity(subject).await
    }

    async fn insert(&self, new_user: &NewUser) -> StoreResult<User> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.insert(new_user).await?;
        }
        self.inner.insert(new_user).await
    }
}

/// Identity verifier accepting a fixed set of assertions
#[derive(Default)]
pub struct StubVerifier {
    identities: HashMap<String, FederatedIdentity>,
}

impl StubVerifier {
    pub fn with_identity(
        mut self,
        assertion: &str,
        subject: &str,
        email: &str,
        display_name: Option<&str>,
    ) -> Self {
        self.identities.insert(
            assertion.to_string(),
            FederatedIdentity {
                subject: subject.to_string(),
                email: email.to_string(),
                display_name: display_name.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify(&self, assertion: &str) -> Result<FederatedIdentity, FederationError> {
        self.identities
            .get(assertion)
            .cloned()
            .ok_or(FederationError::MissingKeyId)
    }
}
