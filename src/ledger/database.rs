use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use tracing::debug;

use super::{CountScope, LedgerError, LedgerStore, NewLedgerEntry, TransactionFilter};
use crate::address::WalletAddress;
use crate::entities::transaction::{self, TransactionStatus};

/// Ledger backed by the relational store through sea-orm.
#[cfg_attr(not(test), derive(Clone))]
pub struct DatabaseLedger {
    database: DatabaseConnection,
}

impl DatabaseLedger {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl LedgerStore for DatabaseLedger {
    async fn record(&self, entry: NewLedgerEntry) -> Result<transaction::Model, LedgerError> {
        let row = transaction::ActiveModel {
            id: NotSet,
            wallet_address: Set(entry.wallet_address),
            transaction_hash: Set(entry.transaction_hash),
            amount: Set(entry.amount),
            status: Set(entry.status),
            error_message: Set(entry.error_message),
            ip_address: Set(entry.ip_address),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let stored = row.insert(&self.database).await?;
        debug!(id = stored.id, status = stored.status.as_str(), "Ledger row written");
        Ok(stored)
    }

    async fn latest_success_since(
        &self,
        wallet: &WalletAddress,
        since: DateTime<Utc>,
    ) -> Result<Option<transaction::Model>, LedgerError> {
        let latest = transaction::Entity::find()
            .filter(transaction::Column::WalletAddress.eq(wallet.to_string()))
            .filter(transaction::Column::Status.eq(TransactionStatus::Success))
            .filter(transaction::Column::CreatedAt.gte(since.fixed_offset()))
            .order_by_desc(transaction::Column::CreatedAt)
            .one(&self.database)
            .await?;
        Ok(latest)
    }

    async fn list(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<transaction::Model>, LedgerError> {
        let mut select = transaction::Entity::find();

        // Addresses are stored lowercase, so lowering the needle is enough.
        if let Some(wallet) = &filter.wallet {
            select = select.filter(transaction::Column::WalletAddress.eq(wallet.to_lowercase()));
        }
        if let Some(from) = filter.from {
            select = select.filter(transaction::Column::CreatedAt.gte(from.fixed_offset()));
        }
        if let Some(to) = filter.to {
            select = select.filter(transaction::Column::CreatedAt.lte(to.fixed_offset()));
        }

        let rows = select
            .order_by_desc(transaction::Column::CreatedAt)
            .order_by_desc(transaction::Column::Id)
            .all(&self.database)
            .await?;
        Ok(rows)
    }

    async fn count(&self, scope: CountScope) -> Result<u64, LedgerError> {
        let mut select = transaction::Entity::find();
        if let Some(since) = scope.since {
            select = select.filter(transaction::Column::CreatedAt.gte(since.fixed_offset()));
        }
        if let Some(status) = scope.status {
            select = select.filter(transaction::Column::Status.eq(status));
        }
        Ok(select.count(&self.database).await?)
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.database.ping().await?;
        Ok(())
    }
}
