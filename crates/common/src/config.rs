use serde::Deserialize;

use crate::types::AccountId;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Socket address the API server binds to
    pub bind_addr: String,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Host (and port) SIWE messages must be issued for
    pub siwe_domain: String,

    /// Administrative account allowed to update the price oracle and mint bootstrap assets
    pub operator_address: AccountId,

    /// Ledger vault account; deposits are pulled into it
    pub pool_address: AccountId,

    /// Custodian account; collateral is approved to and held by it
    pub escrow_address: AccountId,

    /// Interval between keeper sweeps in milliseconds (0 disables the keeper)
    pub keeper_interval_ms: u64,

    /// Bound of the engine's command queue
    pub command_queue_depth: usize,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            bind_addr: std::env::var("LIEN_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            siwe_domain: std::env::var("SIWE_DOMAIN")
                .unwrap_or_else(|_| "localhost:3000".to_string()),
            operator_address: std::env::var("OPERATOR_ADDRESS")
                .map(AccountId::new)
                .map_err(|_| {
                    anyhow::anyhow!("OPERATOR_ADDRESS environment variable is required")
                })?,
            pool_address: AccountId::new(
                std::env::var("POOL_ADDRESS").unwrap_or_else(|_| "0xpool".to_string()),
            ),
            escrow_address: AccountId::new(
                std::env::var("ESCROW_ADDRESS").unwrap_or_else(|_| "0xescrow".to_string()),
            ),
            keeper_interval_ms: std::env::var("KEEPER_INTERVAL_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("KEEPER_INTERVAL_MS must be a valid u64"))?,
            command_queue_depth: std::env::var("COMMAND_QUEUE_DEPTH")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("COMMAND_QUEUE_DEPTH must be a valid usize"))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the engine unusable.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.siwe_domain.trim().is_empty() {
            anyhow::bail!("SIWE_DOMAIN must not be empty");
        }
        if self.command_queue_depth == 0 {
            anyhow::bail!("COMMAND_QUEUE_DEPTH must be at least 1");
        }
        if self.pool_address == self.escrow_address {
            anyhow::bail!("POOL_ADDRESS and ESCROW_ADDRESS must differ");
        }
        Ok(())
    }
}
