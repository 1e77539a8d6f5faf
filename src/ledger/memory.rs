//! In-memory ledger used by tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CountScope, LedgerError, LedgerStore, NewLedgerEntry, TransactionFilter};
use crate::address::WalletAddress;
use crate::entities::transaction::{self, TransactionStatus};

#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    rows: Arc<RwLock<Vec<transaction::Model>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self) -> Vec<transaction::Model> {
        self.rows.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Move a row's `created_at` for fixture setup.
    pub async fn backdate(&self, id: i64, created_at: DateTime<Utc>) {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .expect("row to backdate must exist");
        row.created_at = created_at.fixed_offset();
    }

    /// Insert a row with an explicit timestamp.
    pub async fn insert_at(
        &self,
        entry: NewLedgerEntry,
        created_at: DateTime<Utc>,
    ) -> transaction::Model {
        let stored = self.record(entry).await.expect("memory ledger never fails");
        self.backdate(stored.id, created_at).await;
        transaction::Model {
            created_at: created_at.fixed_offset(),
            ..stored
        }
    }
}

fn within(row: &transaction::Model, since: Option<DateTime<Utc>>) -> bool {
    since.is_none_or(|since| row.created_at >= since.fixed_offset())
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn record(&self, entry: NewLedgerEntry) -> Result<transaction::Model, LedgerError> {
        let mut rows = self.rows.write().await;
        let stored = transaction::Model {
            id: rows.len() as i64 + 1,
            wallet_address: entry.wallet_address,
            transaction_hash: entry.transaction_hash,
            amount: entry.amount,
            status: entry.status,
            error_message: entry.error_message,
            ip_address: entry.ip_address,
            created_at: Utc::now().fixed_offset(),
        };
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn latest_success_since(
        &self,
        wallet: &WalletAddress,
        since: DateTime<Utc>,
    ) -> Result<Option<transaction::Model>, LedgerError> {
        let wallet = wallet.to_string();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| row.wallet_address == wallet)
            .filter(|row| row.status == TransactionStatus::Success)
            .filter(|row| within(row, Some(since)))
            .max_by_key(|row| row.created_at)
            .cloned())
    }

    async fn list(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<transaction::Model>, LedgerError> {
        let wallet = filter.wallet.as_ref().map(|wallet| wallet.to_lowercase());
        let rows = self.rows.read().await;
        let mut matched: Vec<_> = rows
            .iter()
            .filter(|row| wallet.as_ref().is_none_or(|w| &row.wallet_address == w))
            .filter(|row| within(row, filter.from))
            .filter(|row| filter.to.is_none_or(|to| row.created_at <= to.fixed_offset()))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matched)
    }

    async fn count(&self, scope: CountScope) -> Result<u64, LedgerError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| within(row, scope.since))
            .filter(|row| scope.status.is_none_or(|status| row.status == status))
            .count() as u64)
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::*;

    fn wallet(fill: char) -> WalletAddress {
        WalletAddress::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    #[tokio::test]
    async fn test_latest_success_ignores_failures_and_old_rows() {
        let ledger = MemoryLedger::new();
        let amount = Decimal::new(1, 2);
        let now = Utc::now();
        ledger
            .insert_at(
                NewLedgerEntry::failure(&wallet('a'), amount, "boom".into(), None),
                now,
            )
            .await;
        ledger
            .insert_at(
                NewLedgerEntry::success(&wallet('a'), "0x01".into(), amount, None),
                now - Duration::hours(2),
            )
            .await;

        let found = ledger
            .latest_success_since(&wallet('a'), now - Duration::hours(1))
            .await
            .unwrap();
        assert!(found.is_none());

        let found = ledger
            .latest_success_since(&wallet('a'), now - Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(found.map(|row| row.transaction_hash), Some("0x01".into()));
    }
}
