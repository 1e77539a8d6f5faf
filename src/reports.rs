//! Read-only views over the ledger: filtered history and 24h statistics.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::address::ADDRESS_HEX_LEN;
use crate::entities::transaction::{self, TransactionStatus};
use crate::ledger::{CountScope, LedgerError, LedgerStore, TransactionFilter};

pub const STATS_WINDOW: TimeDelta = TimeDelta::hours(24);

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Invalid {0} format. Use ISO format (e.g., 2024-02-17T16:00:00Z)")]
    InvalidDate(&'static str),
    #[error("from_date must be before to_date")]
    InvertedRange,
    #[error("Ensure the wallet filter has no more than 42 characters.")]
    WalletTooLong,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Raw query-string values as they arrive over HTTP.
#[derive(Debug, Clone, Default)]
pub struct RawTransactionQuery<'a> {
    pub wallet: Option<&'a str>,
    pub from_date: Option<&'a str>,
    pub to_date: Option<&'a str>,
}

impl RawTransactionQuery<'_> {
    /// Blank values are treated as absent.
    pub fn parse(&self) -> Result<TransactionFilter, QueryError> {
        fn present(value: Option<&str>) -> Option<&str> {
            value.map(str::trim).filter(|v| !v.is_empty())
        }

        let wallet = present(self.wallet).map(str::to_string);
        if wallet.as_ref().is_some_and(|w| w.len() > ADDRESS_HEX_LEN) {
            return Err(QueryError::WalletTooLong);
        }

        let from = present(self.from_date)
            .map(|raw| parse_timestamp(raw).ok_or(QueryError::InvalidDate("from_date")))
            .transpose()?;
        let to = present(self.to_date)
            .map(|raw| parse_timestamp(raw).ok_or(QueryError::InvalidDate("to_date")))
            .transpose()?;

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(QueryError::InvertedRange);
            }
        }

        Ok(TransactionFilter { wallet, from, to })
    }
}

/// RFC 3339, an ISO date-time with a `+HHMM`/`+HH` offset, or a naive
/// date-time taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(parsed) = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
    {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

pub async fn list_transactions(
    ledger: &dyn LedgerStore,
    query: &RawTransactionQuery<'_>,
) -> Result<Vec<transaction::Model>, ReportError> {
    let filter = query.parse()?;
    Ok(ledger.list(&filter).await?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FaucetStats {
    pub total_transactions: u64,
    pub last_24h_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
}

/// All-time total plus window counts over the 24 hours before `now`.
pub async fn collect_stats(
    ledger: &dyn LedgerStore,
    now: DateTime<Utc>,
) -> Result<FaucetStats, LedgerError> {
    let since = Some(now - STATS_WINDOW);
    let windowed = |status| CountScope { since, status };

    Ok(FaucetStats {
        total_transactions: ledger.count(CountScope::default()).await?,
        last_24h_transactions: ledger.count(windowed(None)).await?,
        successful_transactions: ledger
            .count(windowed(Some(TransactionStatus::Success)))
            .await?,
        failed_transactions: ledger
            .count(windowed(Some(TransactionStatus::Failed)))
            .await?,
    })
}
