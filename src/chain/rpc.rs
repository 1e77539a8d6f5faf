use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;

use crate::address::WalletAddress;

/// Thin Ethereum JSON-RPC client over HTTP.
#[derive(Clone)]
pub struct RpcClient {
    inner: HttpClient,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "RPC endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build RPC client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn transaction_count(&self, address: &WalletAddress) -> Result<u64> {
        let response: String = self
            .inner
            .request(
                "eth_getTransactionCount",
                rpc_params![address.to_string(), "pending"],
            )
            .await
            .context("RPC call eth_getTransactionCount failed")?;
        let nonce = parse_quantity(&response).context("Invalid nonce in node response")?;
        u64::try_from(nonce).map_err(|_| anyhow!("Nonce {nonce} exceeds u64 bounds"))
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let response: String = self
            .inner
            .request("eth_gasPrice", rpc_params![])
            .await
            .context("RPC call eth_gasPrice failed")?;
        parse_quantity(&response).context("Invalid gas price in node response")
    }

    pub async fn balance(&self, address: &WalletAddress) -> Result<u128> {
        let response: String = self
            .inner
            .request("eth_getBalance", rpc_params![address.to_string(), "latest"])
            .await
            .context("RPC call eth_getBalance failed")?;
        parse_quantity(&response).context("Invalid balance in node response")
    }

    /// Broadcast a signed transaction and return the hash the node reports.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        assert!(!raw.is_empty(), "Raw transaction cannot be empty");
        let encoded = format!("0x{}", hex::encode(raw));
        let response: String = self
            .inner
            .request("eth_sendRawTransaction", rpc_params![encoded])
            .await
            .context("RPC call eth_sendRawTransaction failed")?;
        Ok(response)
    }
}

/// Decode a JSON-RPC hex quantity such as `0x4a817c800`.
pub fn parse_quantity(value: &str) -> Result<u128> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("Quantity {value:?} is missing the 0x prefix"))?;
    if digits.is_empty() {
        return Err(anyhow!("Quantity {value:?} has no digits"));
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("Quantity {value:?} is not valid hex"))
}
