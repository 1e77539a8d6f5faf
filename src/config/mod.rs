use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use chrono::TimeDelta;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::chain::to_wei;

/// Environment variables understood for compatibility with existing
/// deployments, mapped onto configuration keys.
const CLASSIC_ENV_KEYS: [(&str, &str); 6] = [
    ("ETHEREUM_NODE_URL", "chain.rpc_url"),
    ("PRIVATE_KEY", "chain.private_key"),
    ("CHAIN_ID", "chain.chain_id"),
    ("FAUCET_AMOUNT", "faucet.amount"),
    ("FAUCET_INTERVAL_MIN", "faucet.wallet_cooldown_minutes"),
    ("DATABASE_URL", "database.url"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub faucet: FaucetConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("FAUCET_CONFIG").unwrap_or_else(|_| "config/faucet.toml".to_string());
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Self::defaults()?
            .add_source(File::new(&configured_path, FileFormat::Toml).required(false));

        if let Ok(env_override) = std::env::var("FAUCET_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/faucet.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FAUCET")
                .prefix_separator("__")
                .separator("__"),
        );

        let builder = apply_classic_env(builder, |key| std::env::var(key).ok())?;
        let config = Self::from_builder(builder)
            .map_err(|err| anyhow!("{err:#} (config file: {configured_path})"))?;
        Ok(config)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.port", 8000)?
            .set_default("database.max_connections", 10)?
            .set_default("chain.request_timeout_ms", 10_000)?
            .set_default("chain.submit_timeout_ms", 30_000)?
            .set_default("faucet.wallet_cooldown_minutes", 1)?
            .set_default("faucet.ip_requests_per_window", 1)?
            .set_default("faucet.ip_window_seconds", 60)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder.build().context("Failed to assemble configuration")?;
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize faucet configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        ensure!(!self.database.url.is_empty(), "Database URL must be specified");
        ensure!(self.server.port > 0, "Server port must be greater than zero");
        ensure!(
            self.database.max_connections >= self.database.min_connections.unwrap_or(1),
            "Max connections must be >= min connections"
        );
        ensure!(
            self.database.max_connections <= 128,
            "Connection pool oversized"
        );
        self.chain.ensure_bounds()?;
        self.faucet.ensure_bounds()?;
        Ok(())
    }
}

/// Layer the classic variable names over everything else, and assemble a
/// database URL from the `POSTGRES_*` parts when none was given.
pub fn apply_classic_env(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (variable, key) in CLASSIC_ENV_KEYS {
        builder = builder.set_override_option(key, lookup(variable).filter(|v| !v.is_empty()))?;
    }

    let part = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
    let assembled = format!(
        "postgres://{}:{}@{}:{}/{}",
        part("POSTGRES_USER", "postgres"),
        part("POSTGRES_PASSWORD", "postgres"),
        part("POSTGRES_HOST", "127.0.0.1"),
        part("POSTGRES_PORT", "5432"),
        part("POSTGRES_DB", "faucet"),
    );
    builder.set_default("database.url", assembled)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The URL may embed credentials
        f.debug_struct("DatabaseConfig")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub private_key: String,
    pub request_timeout_ms: u64,
    pub submit_timeout_ms: u64,
}

impl ChainConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(!self.rpc_url.is_empty(), "Node RPC URL must be specified");
        ensure!(self.chain_id > 0, "Chain id must be positive");
        ensure!(
            !self.private_key.trim().is_empty(),
            "Signing private key must be specified"
        );
        ensure!(
            (100..=60_000).contains(&self.request_timeout_ms),
            "RPC timeout must be between 100ms and 60 seconds"
        );
        ensure!(
            self.submit_timeout_ms >= self.request_timeout_ms,
            "Submission timeout must be >= RPC timeout"
        );
        ensure!(
            self.submit_timeout_ms <= 300_000,
            "Submission timeout cannot exceed 5 minutes"
        );
        Ok(())
    }
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &"<redacted>")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("submit_timeout_ms", &self.submit_timeout_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaucetConfig {
    /// Payout per successful request, in whole currency units
    pub amount: Decimal,
    pub wallet_cooldown_minutes: u32,
    pub ip_requests_per_window: u32,
    pub ip_window_seconds: u64,
}

impl FaucetConfig {
    pub fn wallet_cooldown(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.wallet_cooldown_minutes))
    }

    pub fn ip_window(&self) -> Duration {
        Duration::from_secs(self.ip_window_seconds)
    }

    pub fn amount_wei(&self) -> Result<u128> {
        to_wei(self.amount).ok_or_else(|| {
            anyhow!(
                "Faucet amount {} is not representable in wei",
                self.amount
            )
        })
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(self.amount > Decimal::ZERO, "Faucet amount must be positive");
        let wei = self.amount_wei()?;
        ensure!(wei > 0, "Faucet amount must be at least one wei");
        ensure!(
            self.wallet_cooldown_minutes <= 10_080,
            "Wallet cooldown cannot exceed one week"
        );
        ensure!(
            (1..=10_000).contains(&self.ip_requests_per_window),
            "IP rate limit must be between 1 and 10000 requests per window"
        );
        ensure!(
            (1..=86_400).contains(&self.ip_window_seconds),
            "IP window must be between 1 second and one day"
        );
        Ok(())
    }
}
