use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod account;
mod config;
mod error;
mod federation;
mod jwt;
mod models;
mod password;
mod repositories;
mod routes;
mod state;
mod validation;

#[cfg(test)]
mod testing;

use common::database::{health_check, init_pool, run_migrations};

use crate::{
    account::AccountService, config::AppConfig, federation::GoogleIdentityVerifier,
    jwt::JwtService, repositories::UserRepository, state::AppState,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting account service");

    let config = AppConfig::from_env()?;

    // Initialize database connection pool
    let pool = init_pool(&config.database).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    run_migrations(&pool, &MIGRATOR).await?;

    let jwt_service = JwtService::new(&config.jwt);
    let verifier = GoogleIdentityVerifier::new(&config.federation)?;
    let user_repository = UserRepository::new(pool);

    let accounts = AccountService::new(
        Arc::new(user_repository),
        Arc::new(verifier),
        jwt_service,
    );

    info!("Account service initialized successfully");

    // Start the web server
    let app = routes::create_router(AppState { accounts });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Account service listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
