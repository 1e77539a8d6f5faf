//! Funding orchestration: validate, rate-limit, submit, record.
//!
//! Every request that reaches the chain submitter produces exactly one
//! ledger row, whatever the submission outcome. Validation failures and
//! rate-limit denials never reach the chain and are not recorded.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::address::{AddressError, WalletAddress};
use crate::chain::ChainSubmitter;
use crate::config::FaucetConfig;
use crate::ledger::{LedgerError, LedgerStore, NewLedgerEntry};
use crate::limiter::{Decision, RateLimitDenial, RateLimiter};

mod locks;

use locks::WalletLocks;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundOutcome {
    Funded { tx_hash: String },
    RateLimited(RateLimitDenial),
    Rejected(AddressError),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub wallet: WalletAddress,
    pub eligible: bool,
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub wait: Option<Duration>,
}

pub struct Faucet {
    ledger: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainSubmitter>,
    limiter: Arc<RateLimiter>,
    amount: Decimal,
    amount_wei: u128,
    // Serializes cooldown check, submission and write per wallet
    wallet_locks: WalletLocks,
}

impl Faucet {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainSubmitter>,
        limiter: Arc<RateLimiter>,
        config: &FaucetConfig,
    ) -> Result<Self> {
        let amount_wei = config.amount_wei()?;
        assert!(amount_wei > 0, "Payout must be at least one wei");

        Ok(Self {
            ledger,
            chain,
            limiter,
            amount: config.amount,
            amount_wei,
            wallet_locks: WalletLocks::new(),
        })
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn amount_wei(&self) -> u128 {
        self.amount_wei
    }

    pub async fn fund(&self, raw_wallet: &str, ip: IpAddr) -> Result<FundOutcome, LedgerError> {
        let wallet = match WalletAddress::parse(raw_wallet) {
            Ok(wallet) => wallet,
            Err(err) => return Ok(FundOutcome::Rejected(err)),
        };

        let _guard = self.wallet_locks.acquire(wallet).await;

        if let Decision::Deny(denial) = self
            .limiter
            .may_proceed(self.ledger.as_ref(), ip, &wallet)
            .await?
        {
            info!(%wallet, %ip, reason = denial.reason(), "Funding request rate limited");
            return Ok(FundOutcome::RateLimited(denial));
        }

        match self.chain.send(&wallet, self.amount_wei).await {
            Ok(tx_hash) => {
                let entry =
                    NewLedgerEntry::success(&wallet, tx_hash.clone(), self.amount, Some(ip));
                self.write(entry, &wallet, Some(&tx_hash)).await?;
                info!(%wallet, %ip, %tx_hash, amount = %self.amount, "Faucet payout sent");
                Ok(FundOutcome::Funded { tx_hash })
            }
            Err(err) => {
                let error = err.to_string();
                let entry = NewLedgerEntry::failure(&wallet, self.amount, error.clone(), Some(ip));
                self.write(entry, &wallet, None).await?;
                warn!(%wallet, %ip, %error, "Faucet payout failed");
                Ok(FundOutcome::Failed { error })
            }
        }
    }

    async fn write(
        &self,
        entry: NewLedgerEntry,
        wallet: &WalletAddress,
        tx_hash: Option<&str>,
    ) -> Result<(), LedgerError> {
        if let Err(err) = self.ledger.record(entry).await {
            // The chain may already hold the transfer; this row is the only trace
            error!(
                %wallet,
                tx_hash = tx_hash.unwrap_or(""),
                error = %err,
                "Failed to record funding attempt"
            );
            return Err(err);
        }
        Ok(())
    }

    /// Read-only cooldown evaluation; does not consume an IP slot.
    pub async fn eligibility(&self, wallet: WalletAddress) -> Result<Eligibility, LedgerError> {
        let decision = self
            .limiter
            .wallet_cooldown()
            .check(self.ledger.as_ref(), &wallet, Utc::now())
            .await?;
        Ok(match decision {
            Decision::Deny(RateLimitDenial::Wallet {
                retry_after,
                next_eligible_at,
            }) => Eligibility {
                wallet,
                eligible: false,
                next_eligible_at: Some(next_eligible_at),
                wait: Some(retry_after),
            },
            Decision::Deny(RateLimitDenial::Ip { .. }) | Decision::Allow => Eligibility {
                wallet,
                eligible: true,
                next_eligible_at: None,
                wait: None,
            },
        })
    }
}
