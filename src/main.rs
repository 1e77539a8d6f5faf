mod address;
mod chain;
mod config;
mod entities;
mod faucet;
mod http;
mod ledger;
mod limiter;
mod models;
mod reports;
mod state;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainSubmitter, EthereumSubmitter, RpcClient, TxSigner};
use crate::config::ApiConfig;
use crate::faucet::Faucet;
use crate::ledger::{DatabaseLedger, LedgerStore};
use crate::limiter::RateLimiter;
use crate::state::AppState;
use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::Request;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LIMITER_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ApiConfig::load().context("Failed to load configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let rpc_client = RpcClient::new(&config.chain.rpc_url, config.chain.request_timeout())
        .context("Failed to initialize RPC client")?;
    let signer =
        TxSigner::from_hex(&config.chain.private_key).context("Invalid faucet private key")?;
    info!("Faucet sender address {}", signer.address());

    let chain: Arc<dyn ChainSubmitter> = Arc::new(EthereumSubmitter::new(
        rpc_client,
        signer,
        config.chain.chain_id,
        config.chain.submit_timeout(),
    ));
    let ledger: Arc<dyn LedgerStore> = Arc::new(DatabaseLedger::new(database));
    let limiter = Arc::new(RateLimiter::from_config(&config.faucet));
    let faucet = Faucet::new(
        Arc::clone(&ledger),
        Arc::clone(&chain),
        Arc::clone(&limiter),
        &config.faucet,
    )
    .context("Failed to initialize faucet")?;

    let app_state = AppState::new(
        Arc::new(faucet),
        ledger,
        chain,
        config.faucet.clone(),
        config.chain.chain_id,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let housekeeping_handle = tokio::spawn(async move {
        limiter
            .run_housekeeping(LIMITER_HOUSEKEEPING_INTERVAL, shutdown_rx)
            .await;
    });

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!(
        amount = %config.faucet.amount,
        cooldown_minutes = config.faucet.wallet_cooldown_minutes,
        chain_id = config.chain.chain_id,
        "Faucet API listening on {local_addr}"
    );

    let app = http::with_trailing_slash_support(http::router(app_state));
    let server = axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    );
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Err(join_err) = housekeeping_handle.await {
        error!("Limiter housekeeping task join error: {join_err}");
    }

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false);

    match std::env::var("FAUCET_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.compact().init(),
    }
}

async fn connect_database(config: &ApiConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    Database::connect(options)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
