use std::sync::Arc;
use std::time::Instant;

use crate::chain::ChainSubmitter;
use crate::config::FaucetConfig;
use crate::faucet::Faucet;
use crate::ledger::LedgerStore;

#[derive(Clone)]
pub struct AppState {
    pub faucet: Arc<Faucet>,
    pub ledger: Arc<dyn LedgerStore>,
    pub chain: Arc<dyn ChainSubmitter>,
    pub faucet_config: Arc<FaucetConfig>,
    pub chain_id: u64,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        faucet: Arc<Faucet>,
        ledger: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainSubmitter>,
        faucet_config: FaucetConfig,
        chain_id: u64,
    ) -> Self {
        assert!(chain_id > 0, "Chain id must be configured");
        Self {
            faucet,
            ledger,
            chain,
            faucet_config: Arc::new(faucet_config),
            chain_id,
            start_time: Instant::now(),
        }
    }
}
