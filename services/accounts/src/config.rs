//! Process configuration, loaded once at startup

use anyhow::Result;
use common::database::DatabaseConfig;

use crate::{federation::FederationConfig, jwt::JwtConfig};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Everything the service needs from its environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub federation: FederationConfig,
    /// Address the HTTP server listens on
    pub bind_addr: String,
}

impl AppConfig {
    /// Create a new AppConfig from environment variables
    ///
    /// Missing required settings abort startup.
    ///
    /// # Environment Variables
    /// - `ACCOUNTS_BIND_ADDR`: Listen address (default: 0.0.0.0:3000)
    /// - see [`DatabaseConfig`], [`JwtConfig`] and [`FederationConfig`]
    pub fn from_env() -> Result<Self> {
        let database = DatabaseConfig::from_env()?;
        let jwt = JwtConfig::from_env()?;
        let federation = FederationConfig::from_env()?;

        let bind_addr =
            std::env::var("ACCOUNTS_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Ok(AppConfig {
            database,
            jwt,
            federation,
            bind_addr,
        })
    }
}
