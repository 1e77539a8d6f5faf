//! Builds, signs and broadcasts the faucet's native-currency transfers.

mod rpc;
mod tx;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::address::WalletAddress;

pub use rpc::RpcClient;
pub use tx::{LegacyTransaction, TRANSFER_GAS_LIMIT, TxSigner};

const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{0:#}")]
    Rpc(anyhow::Error),
    #[error("Malformed node response: {0}")]
    MalformedResponse(String),
    #[error("{0:#}")]
    Signing(anyhow::Error),
    #[error("Chain submission timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

#[async_trait]
pub trait ChainSubmitter: Send + Sync {
    /// Transfer `amount_wei` to `to` and return the broadcast hash in
    /// canonical `0x` + 64 lowercase hex form.
    async fn send(&self, to: &WalletAddress, amount_wei: u128) -> Result<String, SubmissionError>;

    fn sender(&self) -> WalletAddress;

    async fn sender_balance(&self) -> Result<u128, SubmissionError>;
}

/// Converts whole currency units to wei. `None` when the amount has more
/// than 18 fractional digits, is negative, or overflows.
pub fn to_wei(amount: Decimal) -> Option<u128> {
    if amount.is_sign_negative() || amount.scale() > 18 {
        return None;
    }
    amount
        .checked_mul(Decimal::from(WEI_PER_ETHER))
        .and_then(|wei| wei.to_u128())
}

/// Normalizes a node-reported hash to `0x` + 64 lowercase hex digits.
pub fn normalize_tx_hash(reported: &str) -> Result<String, SubmissionError> {
    let trimmed = reported.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SubmissionError::MalformedResponse(format!(
            "unexpected transaction hash {reported:?}"
        )));
    }
    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

/// Submits EIP-155 legacy transfers through a JSON-RPC node.
pub struct EthereumSubmitter {
    rpc: RpcClient,
    signer: TxSigner,
    chain_id: u64,
    submit_timeout: Duration,
    // One submission at a time so concurrent requests never share a nonce
    submission: Mutex<()>,
}

impl EthereumSubmitter {
    pub fn new(rpc: RpcClient, signer: TxSigner, chain_id: u64, submit_timeout: Duration) -> Self {
        assert!(chain_id > 0, "Chain id must be positive");
        assert!(
            submit_timeout >= rpc.timeout(),
            "Submission timeout must cover at least one RPC call"
        );
        Self {
            rpc,
            signer,
            chain_id,
            submit_timeout,
            submission: Mutex::new(()),
        }
    }

    async fn submit(&self, to: &WalletAddress, amount_wei: u128) -> Result<String, SubmissionError> {
        let sender = self.signer.address();
        let nonce = self
            .rpc
            .transaction_count(&sender)
            .await
            .map_err(SubmissionError::Rpc)?;
        let gas_price = self.rpc.gas_price().await.map_err(SubmissionError::Rpc)?;
        debug!(nonce, gas_price, "Fetched account state");

        let tx = LegacyTransaction::transfer(nonce, gas_price, *to, amount_wei, self.chain_id);
        let signed = tx.sign(&self.signer).map_err(SubmissionError::Signing)?;

        let reported = self
            .rpc
            .send_raw_transaction(signed.raw())
            .await
            .map_err(SubmissionError::Rpc)?;
        let tx_hash = normalize_tx_hash(&reported)?;
        if tx_hash != signed.hash_hex() {
            warn!(
                reported = %tx_hash,
                computed = %signed.hash_hex(),
                "Node reported a different transaction hash"
            );
        }

        info!(%to, nonce, %tx_hash, "Transfer broadcast");
        Ok(tx_hash)
    }
}

#[async_trait]
impl ChainSubmitter for EthereumSubmitter {
    async fn send(&self, to: &WalletAddress, amount_wei: u128) -> Result<String, SubmissionError> {
        assert!(amount_wei > 0, "Transfer amount must be positive");
        let attempt = async {
            let _guard = self.submission.lock().await;
            self.submit(to, amount_wei).await
        };
        tokio::time::timeout(self.submit_timeout, attempt)
            .await
            .map_err(|_| SubmissionError::Timeout(self.submit_timeout))?
    }

    fn sender(&self) -> WalletAddress {
        self.signer.address()
    }

    async fn sender_balance(&self) -> Result<u128, SubmissionError> {
        self.rpc
            .balance(&self.signer.address())
            .await
            .map_err(SubmissionError::Rpc)
    }
}
