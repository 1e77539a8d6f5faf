//! Ledger entity: one row per funding attempt that reached the chain.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Recipient wallet, canonical lowercase `0x` form
    #[sea_orm(column_type = "String(StringLen::N(42))")]
    pub wallet_address: String,
    /// Broadcast hash (`0x` + 64 hex), empty when the submission failed
    #[sea_orm(column_type = "String(StringLen::N(66))")]
    pub transaction_hash: String,
    /// Payout in whole currency units
    #[sea_orm(column_type = "Decimal(Some((36, 18)))")]
    pub amount: Decimal,
    pub status: TransactionStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    /// IP address of the requester
    #[sea_orm(column_type = "String(StringLen::N(45))", nullable)]
    pub ip_address: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}
