//! PostgreSQL-backed user repository

use async_trait::async_trait;
use common::error::DatabaseError;
use sqlx::PgPool;
use tracing::info;

use super::{StoreError, StoreResult, UniqueField, UserStore};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, external_identity_id, is_active, created_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");

        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(user)
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn find_by_external_identity(&self, subject: &str) -> StoreResult<Option<User>> {
        self.find_one("external_identity_id", subject).await
    }

    async fn insert(&self, new_user: &NewUser) -> StoreResult<User> {
        info!("Creating new user: {}", new_user.username);

        let sql = format!(
            r#"
            INSERT INTO users (username, email, password_hash, external_identity_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(new_user.password_hash())
            .bind(new_user.external_identity_id())
            .fetch_one(&self.pool)
            .await
            .map_err(classify_insert_error)
    }
}

/// Turn a unique-constraint violation into the field it guards
fn classify_insert_error(err: sqlx::Error) -> StoreError {
    let field = err
        .as_database_error()
        .filter(|db_err| db_err.is_unique_violation())
        .and_then(|db_err| db_err.constraint())
        .and_then(unique_field_for_constraint);

    match field {
        Some(field) => StoreError::UniqueViolation(field),
        None => StoreError::Database(DatabaseError::Query(err)),
    }
}

fn unique_field_for_constraint(constraint: &str) -> Option<UniqueField> {
    match constraint {
        "users_username_key" => Some(UniqueField::Username),
        "users_email_key" => Some(UniqueField::Email),
        "users_external_identity_id_key" => Some(UniqueField::ExternalIdentity),
        _ => None,
    }
}
