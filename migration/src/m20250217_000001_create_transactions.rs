use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per funding attempt that reached the chain, success or failure
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Transactions::WalletAddress)
                            .string_len(42)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::TransactionHash)
                            .string_len(66)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Transactions::Amount)
                            .decimal_len(36, 18)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::Status)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(Transactions::IpAddress)
                            .string_len(45) // IPv6 max length
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Wallet cooldown lookups
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transactions_wallet_time")
                    .table(Transactions::Table)
                    .col(Transactions::WalletAddress)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Windowed statistics
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transactions_status_time")
                    .table(Transactions::Table)
                    .col(Transactions::Status)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transactions_created_at")
                    .table(Transactions::Table)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    WalletAddress,
    TransactionHash,
    Amount,
    Status,
    ErrorMessage,
    IpAddress,
    CreatedAt,
}
