//! Account service: registration, local and federated sign-in, session tokens

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    error::{AuthError, AuthResult},
    federation::{FederationError, IdentityVerifier},
    jwt::JwtService,
    models::{NewUser, User},
    password,
    repositories::{StoreError, UserStore},
};

/// Orchestrates the credential store, password hashing, token signing and
/// identity federation.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    verifier: Arc<dyn IdentityVerifier>,
    jwt_service: JwtService,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn UserStore>,
        verifier: Arc<dyn IdentityVerifier>,
        jwt_service: JwtService,
    ) -> Self {
        Self {
            store,
            verifier,
            jwt_service,
        }
    }

    /// Register an account with a locally chosen password
    pub async fn register_local(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<User> {
        info!("Registration attempt for user: {}", username);

        if self.store.find_by_email(email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        if self.store.find_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let password_hash = password::hash_password(password)?;

        // A concurrent registration can still win the race; the store's
        // constraint then reports which field collided.
        let user = self
            .store
            .insert(&NewUser::local(username, email, password_hash))
            .await?;

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Check a username and password pair
    pub async fn authenticate_local(&self, username: &str, password: &str) -> AuthResult<User> {
        info!("Login attempt for user: {}", username);

        let Some(user) = self.store.find_by_username(username).await? else {
            password::verify_dummy_password(password)?;
            warn!("Login rejected for user: {}", username);
            return Err(AuthError::InvalidCredentials);
        };

        let Some(password_hash) = user.password_hash.as_deref() else {
            password::verify_dummy_password(password)?;
            warn!("Login rejected for user without local password: {}", username);
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, password_hash)? || !user.is_active {
            warn!("Login rejected for user: {}", username);
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Sign in with a third-party identity assertion, provisioning the
    /// account on first use
    pub async fn authenticate_federated(&self, assertion: &str) -> AuthResult<User> {
        let identity = self.verifier.verify(assertion).await.map_err(|e| {
            match &e {
                FederationError::KeyFetch(_) => error!("Identity verification failed: {}", e),
                _ => warn!("Identity assertion rejected: {}", e),
            }
            AuthError::InvalidAssertion
        })?;

        if let Some(user) = self
            .store
            .find_by_external_identity(&identity.subject)
            .await?
        {
            info!("Federated login for existing user: {}", user.username);
            return Ok(user);
        }

        if self.store.find_by_email(&identity.email).await?.is_some() {
            warn!(
                "Federated login conflicts with an existing account for email: {}",
                identity.email
            );
            return Err(AuthError::AccountConflict);
        }

        let username = identity
            .display_name
            .as_deref()
            .unwrap_or(identity.email.as_str());
        let new_user = NewUser::federated(username, &identity.email, &identity.subject);

        match self.store.insert(&new_user).await {
            Ok(user) => {
                info!("Provisioned federated user {} ({})", user.username, user.id);
                Ok(user)
            }
            Err(StoreError::UniqueViolation(field)) => {
                // A concurrent first login for the same subject collides on
                // whichever constraint the store checks first
                if let Some(user) = self
                    .store
                    .find_by_external_identity(&identity.subject)
                    .await?
                {
                    info!("Federated user {} provisioned concurrently", user.username);
                    return Ok(user);
                }
                warn!("Federated provisioning collided on {:?}", field);
                Err(AuthError::AccountConflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Issue a bearer token whose subject is the username
    pub fn issue_session_token(&self, user: &User) -> AuthResult<String> {
        Ok(self.jwt_service.generate_access_token(user)?)
    }

    /// Resolve a bearer token back to an active user
    pub async fn resolve_session_token(&self, token: &str) -> AuthResult<User> {
        let claims = self.jwt_service.validate_token(token).map_err(|e| {
            warn!("Session token rejected: {}", e);
            AuthError::Unauthorized
        })?;

        match self.store.find_by_username(&claims.sub).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(AuthError::Unauthorized),
        }
    }

    /// Access token lifetime in seconds
    pub fn token_expiry(&self) -> u64 {
        self.jwt_service.access_token_expiry()
    }
}
