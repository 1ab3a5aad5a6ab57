//! The node collaborator: the RPC surface the engine and driver consume, and its alloy
//! implementation.

use crate::config::RpcConfig;
use crate::retry::{across_endpoints, always_transient, FailoverPolicy, Failure};
use alloy::{
    primitives::{Address, Bytes, B256, U256},
    providers::{Provider as _, RootProvider},
    rpc::types::{BlockNumberOrTag, TransactionRequest},
    sol,
    transports::TransportError,
};
use eyre::Context as _;
use alloy::transports::http::reqwest::Client;
use std::future::Future;
use std::time::{Duration, Instant};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

type EvmProvider = RootProvider;

/// Fee-relevant part of a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFees {
    pub number: u64,
    pub base_fee_per_gas: Option<u128>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// RPC operations the swap engine needs from a chain node.
///
/// `call` and `estimate_gas` are expected to fail when the target would revert; their error
/// text should carry any revert payload the node returned.
pub trait ChainNode: Sync {
    fn balance(&self, addr: Address) -> impl Future<Output = eyre::Result<U256>> + Send;

    /// ERC-20 `balanceOf(owner)` and `decimals()` of `token`.
    fn token_balance(
        &self,
        token: Address,
        owner: Address,
    ) -> impl Future<Output = eyre::Result<(U256, u8)>> + Send;

    fn call(
        &self,
        tx: &TransactionRequest,
        block: BlockNumberOrTag,
    ) -> impl Future<Output = eyre::Result<Bytes>> + Send;

    fn estimate_gas(&self, tx: &TransactionRequest)
        -> impl Future<Output = eyre::Result<u64>> + Send;

    /// `Ok(None)` when the node has no block for `tag`.
    fn block_fees(
        &self,
        tag: BlockNumberOrTag,
    ) -> impl Future<Output = eyre::Result<Option<BlockFees>>> + Send;

    fn transaction_count(&self, addr: Address) -> impl Future<Output = eyre::Result<u64>> + Send;

    fn chain_id(&self) -> impl Future<Output = eyre::Result<u64>> + Send;

    fn gas_price(&self) -> impl Future<Output = eyre::Result<u128>> + Send;

    fn send_raw_transaction(&self, raw: &[u8]) -> impl Future<Output = eyre::Result<B256>> + Send;

    fn wait_for_receipt(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> impl Future<Output = eyre::Result<ReceiptSummary>> + Send;
}

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

/// JSON-RPC node with optional fallback endpoints.
///
/// Reads fail over across every endpoint. Simulation only talks to the primary endpoint so a
/// lagging fallback cannot hide a revert.
#[derive(Debug, Clone)]
pub struct RpcNode {
    rpc_url: String,
    fallback_rpc_urls: Vec<String>,
    timeout: Duration,
    connect_timeout: Duration,
    reads: FailoverPolicy,
}

impl RpcNode {
    pub fn from_config(cfg: &RpcConfig) -> Self {
        Self {
            rpc_url: cfg.rpc_url.trim().to_owned(),
            fallback_rpc_urls: cfg.fallback_rpc_urls.clone(),
            timeout: Duration::from_secs(cfg.timeout_seconds),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_seconds),
            reads: FailoverPolicy::reads(cfg.retry_rounds),
        }
    }

    fn provider_for_url(&self, url: &str) -> eyre::Result<EvmProvider> {
        let u: alloy::transports::http::reqwest::Url = url
            .parse()
            .with_context(|| format!("invalid rpc url: {url}"))?;
        let client = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .context("build rpc http client")?;
        let http = alloy::transports::http::Http::with_client(client, u);
        let rpc_client = alloy::rpc::client::RpcClient::new(http, false);
        Ok(RootProvider::new(rpc_client))
    }

    fn primary(&self) -> eyre::Result<EvmProvider> {
        self.provider_for_url(&self.rpc_url)
    }

    fn all_rpc_urls(&self) -> Vec<String> {
        let mut urls = Vec::with_capacity(1 + self.fallback_rpc_urls.len());
        for u in std::iter::once(&self.rpc_url).chain(&self.fallback_rpc_urls) {
            let t = u.trim();
            if t.is_empty() || urls.iter().any(|x| x == t) {
                continue;
            }
            urls.push(t.to_owned());
        }
        urls
    }

    /// Read-only request under `policy`, failing over across every endpoint.
    async fn read_with<T, Fut>(
        &self,
        policy: FailoverPolicy,
        label: &'static str,
        classify: fn(&eyre::Report) -> Failure,
        f: impl Fn(EvmProvider) -> Fut + Sync,
    ) -> eyre::Result<T>
    where
        T: Send,
        Fut: Future<Output = eyre::Result<T>> + Send,
    {
        let urls = self.all_rpc_urls();
        across_endpoints(&urls, policy, label, classify, |u| {
            let p = self.provider_for_url(u);
            let f = &f;
            async move { f(p?).await }
        })
        .await
    }

    async fn read<T, Fut>(
        &self,
        label: &'static str,
        f: impl Fn(EvmProvider) -> Fut + Sync,
    ) -> eyre::Result<T>
    where
        T: Send,
        Fut: Future<Output = eyre::Result<T>> + Send,
    {
        self.read_with(self.reads, label, always_transient, f).await
    }
}

/// Render a simulation failure, appending the JSON-RPC error `data` payload as its own
/// whitespace-separated token so revert extraction can find it.
fn simulation_error(label: &str, e: &TransportError) -> eyre::Report {
    let data = e
        .as_error_resp()
        .and_then(|payload| payload.as_revert_data())
        .filter(|d| !d.is_empty());
    match data {
        Some(d) => eyre::eyre!("{label}: {e} revert data: 0x{}", hex::encode(&d)),
        None => eyre::eyre!("{label}: {e}"),
    }
}

/// Contract reads that revert will revert on every node.
fn contract_read_failure(err: &eyre::Report) -> Failure {
    if format!("{err:#}").to_lowercase().contains("execution reverted") {
        Failure::Fatal
    } else {
        Failure::Transient
    }
}

/// Rejections based on transaction contents or account state; another node gives the same
/// answer.
fn broadcast_failure(err: &eyre::Report) -> Failure {
    const PERMANENT: &[&str] = &[
        "nonce too low",
        "insufficient funds",
        "replacement transaction underpriced",
        "intrinsic gas too low",
        "exceeds block gas limit",
        "invalid sender",
        "invalid signature",
        "execution reverted",
    ];
    let s = format!("{err:#}").to_lowercase();
    if PERMANENT.iter().any(|p| s.contains(p)) {
        Failure::Fatal
    } else {
        Failure::Transient
    }
}

// Nodes that already hold the transaction answer a re-broadcast with these.
fn broadcast_err_is_ok(err: &eyre::Report) -> bool {
    let s = format!("{err:#}").to_lowercase();
    s.contains("already known")
        || s.contains("known transaction")
        || s.contains("already imported")
        || s.contains("already in mempool")
}

impl ChainNode for RpcNode {
    async fn balance(&self, addr: Address) -> eyre::Result<U256> {
        self.read("get balance", |p| async move {
            p.get_balance(addr).await.context("get balance")
        })
        .await
    }

    async fn token_balance(&self, token: Address, owner: Address) -> eyre::Result<(U256, u8)> {
        self.read_with(self.reads, "erc20 balance", contract_read_failure, |p| async move {
            let c = IERC20::new(token, &p);
            let bal = c.balanceOf(owner).call().await.context("erc20 balanceOf")?;
            let decimals = c.decimals().call().await.context("erc20 decimals")?;
            Ok((bal, decimals))
        })
        .await
    }

    async fn call(&self, tx: &TransactionRequest, block: BlockNumberOrTag) -> eyre::Result<Bytes> {
        let p = self.primary()?;
        p.call(tx.clone())
            .block(block.into())
            .await
            .map_err(|e| simulation_error("eth_call", &e))
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> eyre::Result<u64> {
        let p = self.primary()?;
        p.estimate_gas(tx.clone())
            .await
            .map_err(|e| simulation_error("eth_estimateGas", &e))
    }

    async fn block_fees(&self, tag: BlockNumberOrTag) -> eyre::Result<Option<BlockFees>> {
        self.read("get block", |p| async move {
            let block = p.get_block_by_number(tag).await.context("get block")?;
            Ok(block.map(|b| BlockFees {
                number: b.header.number,
                base_fee_per_gas: b.header.base_fee_per_gas.map(u128::from),
            }))
        })
        .await
    }

    async fn transaction_count(&self, addr: Address) -> eyre::Result<u64> {
        self.read("get nonce", |p| async move {
            p.get_transaction_count(addr)
                .pending()
                .await
                .context("get transaction count")
        })
        .await
    }

    async fn chain_id(&self) -> eyre::Result<u64> {
        self.read("get chain id", |p| async move {
            p.get_chain_id().await.context("get chain id")
        })
        .await
    }

    async fn gas_price(&self) -> eyre::Result<u128> {
        self.read("get gas price", |p| async move {
            p.get_gas_price().await.context("get gas price")
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> eyre::Result<B256> {
        let tx_hash = alloy::primitives::keccak256(raw);
        let urls = self.all_rpc_urls();
        across_endpoints(
            &urls,
            FailoverPolicy::broadcast(),
            "send transaction",
            broadcast_failure,
            |u| {
                let p = self.provider_for_url(u);
                async move {
                    match p?.send_raw_transaction(raw).await {
                        Ok(_pending) => Ok(()),
                        Err(e) => {
                            let report = simulation_error("eth_sendRawTransaction", &e);
                            if broadcast_err_is_ok(&report) {
                                Ok(())
                            } else {
                                Err(report)
                            }
                        }
                    }
                }
            },
        )
        .await?;
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256, timeout: Duration) -> eyre::Result<ReceiptSummary> {
        // The poll loop is the retry: one pass per tick, errors only matter at the deadline.
        let start = Instant::now();
        let mut last_err = None;
        loop {
            if start.elapsed() > timeout {
                let secs = timeout.as_secs();
                return Err(match last_err {
                    Some(e) => eyre::eyre!(
                        "timed out after {secs}s waiting for receipt of {tx_hash} (last poll error: {e:#})"
                    ),
                    None => eyre::eyre!("timed out after {secs}s waiting for receipt of {tx_hash}"),
                });
            }
            let polled = self
                .read_with(
                    FailoverPolicy::single_pass(),
                    "get receipt",
                    always_transient,
                    |p| async move {
                        p.get_transaction_receipt(tx_hash)
                            .await
                            .context("get transaction receipt")
                    },
                )
                .await;
            match polled {
                Ok(Some(r)) => {
                    return Ok(ReceiptSummary {
                        tx_hash,
                        success: r.status(),
                        block_number: r.block_number,
                        gas_used: r.gas_used,
                    });
                }
                Ok(None) => last_err = None,
                Err(e) => {
                    tracing::debug!(%tx_hash, error = %format!("{e:#}"), "receipt poll failed");
                    last_err = Some(e);
                }
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(primary: &str, fallbacks: &[&str]) -> RpcNode {
        RpcNode::from_config(&RpcConfig {
            rpc_url: primary.to_owned(),
            fallback_rpc_urls: fallbacks.iter().map(|s| (*s).to_owned()).collect(),
            ..RpcConfig::default()
        })
    }

    #[test]
    fn rpc_urls_are_deduplicated_and_primary_first() {
        let n = node(
            " https://a.example ",
            &["https://b.example", "", "https://a.example", "https://b.example"],
        );
        assert_eq!(
            n.all_rpc_urls(),
            vec!["https://a.example".to_owned(), "https://b.example".to_owned()]
        );
    }

    #[test]
    fn invalid_rpc_url_is_rejected() {
        let n = node("not a url", &[]);
        assert!(n.primary().is_err(), "expected url parse failure");
    }

    #[test]
    fn already_known_broadcasts_are_success() {
        assert!(broadcast_err_is_ok(&eyre::eyre!(
            "server returned an error response: error code -32000: already known"
        )));
        assert!(!broadcast_err_is_ok(&eyre::eyre!("nonce too low")));
    }

    #[test]
    fn permanent_broadcast_rejections_are_not_retried() {
        for msg in [
            "error code -32000: nonce too low: next nonce 8, tx nonce 7",
            "error code -32000: insufficient funds for gas * price + value",
            "error code -32000: replacement transaction underpriced",
        ] {
            assert_eq!(broadcast_failure(&eyre::eyre!("{msg}")), Failure::Fatal, "{msg}");
        }
        for msg in ["error sending request: connection refused", "503 Service Unavailable"] {
            assert_eq!(broadcast_failure(&eyre::eyre!("{msg}")), Failure::Transient, "{msg}");
        }
    }

    #[test]
    fn reverting_token_reads_stop_early() {
        let revert = eyre::eyre!("execution reverted").wrap_err("erc20 balanceOf");
        assert_eq!(contract_read_failure(&revert), Failure::Fatal);
        assert_eq!(
            contract_read_failure(&eyre::eyre!("operation timed out")),
            Failure::Transient
        );
    }

    #[tokio::test]
    async fn broadcast_to_dead_endpoints_fails_after_two_passes() {
        let n = node("http://127.0.0.1:9", &["http://127.0.0.1:10"]);
        let started = Instant::now();
        let r = n.send_raw_transaction(&[0x02, 0xc0]).await;
        assert!(r.is_err(), "nothing is listening");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "broadcast kept retrying: {:?}",
            started.elapsed()
        );
    }
}
