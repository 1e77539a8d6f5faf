//! Durable record of funding attempts.
//!
//! Every attempt that reaches the chain is written exactly once, success or
//! failure. Rows are never updated or deleted by the running service.

mod database;
#[cfg(test)]
pub mod memory;

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::DbErr;
use thiserror::Error;

use crate::address::WalletAddress;
use crate::entities::transaction::{self, TransactionStatus};

pub use database::DatabaseLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Database(#[from] DbErr),
}

/// A row about to be written. Construct through [`NewLedgerEntry::success`]
/// or [`NewLedgerEntry::failure`] so the status invariants hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub wallet_address: String,
    pub transaction_hash: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
}

impl NewLedgerEntry {
    pub fn success(
        wallet: &WalletAddress,
        transaction_hash: String,
        amount: Decimal,
        ip: Option<IpAddr>,
    ) -> Self {
        assert!(
            !transaction_hash.is_empty(),
            "Successful entries carry a transaction hash"
        );
        assert!(amount > Decimal::ZERO, "Payout amount must be positive");
        Self {
            wallet_address: wallet.to_string(),
            transaction_hash,
            amount,
            status: TransactionStatus::Success,
            error_message: None,
            ip_address: ip.map(|ip| ip.to_string()),
        }
    }

    pub fn failure(
        wallet: &WalletAddress,
        amount: Decimal,
        error: String,
        ip: Option<IpAddr>,
    ) -> Self {
        assert!(amount > Decimal::ZERO, "Payout amount must be positive");
        Self {
            wallet_address: wallet.to_string(),
            transaction_hash: String::new(),
            amount,
            status: TransactionStatus::Failed,
            error_message: Some(error),
            ip_address: ip.map(|ip| ip.to_string()),
        }
    }
}

/// Filter for listing records. `wallet` is matched case-insensitively and
/// both time bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub wallet: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Which rows a count covers. Empty scope counts everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountScope {
    pub since: Option<DateTime<Utc>>,
    pub status: Option<TransactionStatus>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist one attempt and return the stored row.
    async fn record(&self, entry: NewLedgerEntry) -> Result<transaction::Model, LedgerError>;

    /// Most recent successful payout to `wallet` created at or after `since`.
    async fn latest_success_since(
        &self,
        wallet: &WalletAddress,
        since: DateTime<Utc>,
    ) -> Result<Option<transaction::Model>, LedgerError>;

    /// Matching rows, newest first.
    async fn list(&self, filter: &TransactionFilter)
    -> Result<Vec<transaction::Model>, LedgerError>;

    async fn count(&self, scope: CountScope) -> Result<u64, LedgerError>;

    async fn ping(&self) -> Result<(), LedgerError>;
}
