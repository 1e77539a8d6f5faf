use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::transaction::{self, TransactionStatus};
use crate::reports::RawTransactionQuery;

#[derive(Debug, Deserialize)]
pub struct FundRequest {
    #[serde(default)]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FundResponse {
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    pub transaction_hash: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub wallet_address: String,
}

impl From<transaction::Model> for TransactionView {
    fn from(model: transaction::Model) -> Self {
        Self {
            transaction_hash: model.transaction_hash,
            amount: model.amount,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
            wallet_address: model.wallet_address,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct TransactionQuery {
    pub wallet: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

impl TransactionQuery {
    pub fn as_raw(&self) -> RawTransactionQuery<'_> {
        RawTransactionQuery {
            wallet: self.wallet.as_deref(),
            from_date: self.from_date.as_deref(),
            to_date: self.to_date.as_deref(),
        }
    }
}

/// Wei figures are strings so JSON clients keep full precision.
#[derive(Debug, Serialize)]
pub struct FaucetStatusResponse {
    pub faucet_address: String,
    pub balance_wei: String,
    pub payout_amount: Decimal,
    pub payout_wei: String,
    pub gas_limit: u64,
    pub chain_id: u64,
    pub wallet_cooldown_minutes: u32,
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub address: String,
    pub eligible: bool,
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub wait_seconds: Option<u64>,
    pub message: String,
}
