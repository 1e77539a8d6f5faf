//! Doubles and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::address::WalletAddress;
use crate::chain::{ChainSubmitter, SubmissionError};
use crate::config::FaucetConfig;

pub const SENDER: &str = "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f";

pub fn wallet_str(fill: char) -> String {
    format!("0x{}", fill.to_string().repeat(40))
}

pub fn tx_hash(fill: char) -> String {
    format!("0x{}", fill.to_string().repeat(64))
}

pub fn faucet_config() -> FaucetConfig {
    FaucetConfig {
        amount: Decimal::from_str("0.01").unwrap(),
        wallet_cooldown_minutes: 1,
        ip_requests_per_window: 1,
        ip_window_seconds: 60,
    }
}

/// Replays queued outcomes; succeeds with a fixed hash once the queue is
/// empty.
#[derive(Default)]
pub struct ScriptedSubmitter {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    sent: Mutex<Vec<(WalletAddress, u128)>>,
}

impl ScriptedSubmitter {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(outcomes: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        })
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn sent(&self) -> Vec<(WalletAddress, u128)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ChainSubmitter for ScriptedSubmitter {
    async fn send(&self, to: &WalletAddress, amount_wei: u128) -> Result<String, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().await.push((*to, amount_wei));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().await.pop_front() {
            Some(Ok(hash)) => Ok(hash),
            Some(Err(message)) => Err(SubmissionError::Rpc(anyhow::anyhow!(message))),
            None => Ok(tx_hash('a')),
        }
    }

    fn sender(&self) -> WalletAddress {
        WalletAddress::parse(SENDER).unwrap()
    }

    async fn sender_balance(&self) -> Result<u128, SubmissionError> {
        Ok(5_000_000_000_000_000_000)
    }
}
