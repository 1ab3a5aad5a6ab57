use crate::engine::EngineSettings;
use crate::gas::GasBuffer;
use alloy::primitives::Address;
use eyre::Context as _;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const KYOKO_ROUTE_URL: &str = "https://rpc.kyo.finance/router/route";
pub const KYOKO_APP_ORIGIN: &str = "https://app.kyo.finance";
pub const KYOKO_ROUTER_ADDRESS: &str = "0xf4087AFfE358c1f267Cca84293abB89C4BD10712";
pub const USDC_ADDRESS: &str = "0xbA9986D2381edf1DA03B0B9c1f8b00dc4AacC369";
/// Placeholder the quoting service uses for the chain's native coin.
pub const NATIVE_PLACEHOLDER: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Primary JSON-RPC endpoint. Required; usually supplied via `RPC_URL`.
    pub rpc_url: String,
    /// Extra endpoints for read-only queries and broadcast.
    pub fallback_rpc_urls: Vec<String>,
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    /// Full passes over the endpoint list before a read gives up.
    pub retry_rounds: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            fallback_rpc_urls: vec![],
            timeout_seconds: 20,
            connect_timeout_seconds: 5,
            retry_rounds: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// Kyoko route endpoint.
    ///
    /// Must be `https`, except `http://localhost` / `http://127.0.0.1` / `http://[::1]` for
    /// local testing.
    pub api_url: String,
    /// Sent as `Origin`; `Referer` is the same value with a trailing slash.
    pub origin_header: String,
    pub timeout_seconds: u64,
    /// Router the quotes are expected to target. A quote pointing elsewhere is logged.
    pub router_address: Option<String>,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            api_url: KYOKO_ROUTE_URL.into(),
            origin_header: KYOKO_APP_ORIGIN.into(),
            timeout_seconds: 30,
            router_address: Some(KYOKO_ROUTER_ADDRESS.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    pub native_placeholder: String,
    pub usdc_address: String,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            native_placeholder: NATIVE_PLACEHOLDER.into(),
            usdc_address: USDC_ADDRESS.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Applied to gas estimates and hints, rounding up. Written as a string (`"1.2"`).
    pub gas_buffer_multiplier: Decimal,
    /// Priority fee used when fees are derived from the chain's base fee (wei).
    pub priority_fee_wei: u64,
    pub receipt_timeout_seconds: u64,
    /// Refuse to submit when simulation reverted, even if a gas figure is available.
    pub abort_on_simulation_revert: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gas_buffer_multiplier: GasBuffer::default().multiplier(),
            priority_fee_wei: 1_000_000_000,
            receipt_timeout_seconds: 180,
            abort_on_simulation_revert: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub dry_run: bool,
    /// Fraction, e.g. `"0.01"` for 1%.
    pub slippage: Decimal,
    pub delay_between_swaps_seconds: u64,
    pub delay_after_failure_seconds: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            slippage: Decimal::new(1, 2),
            delay_between_swaps_seconds: 10,
            delay_after_failure_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub rpc: RpcConfig,
    pub quote: QuoteConfig,
    pub tokens: TokensConfig,
    pub engine: EngineConfig,
    pub driver: DriverConfig,
}

fn is_loopback_http(url: &reqwest::Url) -> bool {
    url.scheme() == "http"
        && matches!(
            url.host_str(),
            Some("localhost" | "127.0.0.1" | "[::1]" | "::1")
        )
}

fn parse_address(label: &str, s: &str) -> eyre::Result<Address> {
    s.trim()
        .parse::<Address>()
        .with_context(|| format!("invalid {label}: {s}"))
}

impl SwapConfig {
    /// Check everything a swap run depends on. `config` and `paths` do not call this so a broken
    /// file can still be inspected.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.rpc.rpc_url.trim().is_empty() {
            eyre::bail!("rpc url is not set (set RPC_URL or rpc.rpc_url in config.toml)");
        }
        self.rpc
            .rpc_url
            .trim()
            .parse::<reqwest::Url>()
            .with_context(|| format!("invalid rpc url: {}", self.rpc.rpc_url))?;

        let api: reqwest::Url = self
            .quote
            .api_url
            .trim()
            .parse()
            .with_context(|| format!("invalid quote api url: {}", self.quote.api_url))?;
        if api.scheme() != "https" && !is_loopback_http(&api) {
            eyre::bail!("quote api url must be https (or loopback http): {api}");
        }

        if self.engine.gas_buffer_multiplier <= Decimal::ZERO {
            eyre::bail!(
                "gas buffer multiplier must be positive (got {})",
                self.engine.gas_buffer_multiplier
            );
        }
        if self.driver.slippage < Decimal::ZERO || self.driver.slippage >= Decimal::ONE {
            eyre::bail!(
                "slippage must be in [0, 1) (got {})",
                self.driver.slippage
            );
        }
        self.usdc_address()?;
        self.native_placeholder()?;
        self.expected_router()?;
        Ok(())
    }

    pub fn usdc_address(&self) -> eyre::Result<Address> {
        parse_address("usdc address", &self.tokens.usdc_address)
    }

    pub fn native_placeholder(&self) -> eyre::Result<Address> {
        parse_address("native placeholder", &self.tokens.native_placeholder)
    }

    pub fn expected_router(&self) -> eyre::Result<Option<Address>> {
        self.quote
            .router_address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_address("router address", s))
            .transpose()
    }

    pub fn engine_settings(&self) -> eyre::Result<EngineSettings> {
        Ok(EngineSettings {
            gas_buffer: GasBuffer::new(self.engine.gas_buffer_multiplier)?,
            priority_fee_per_gas: u128::from(self.engine.priority_fee_wei),
            abort_on_simulation_revert: self.engine.abort_on_simulation_revert,
        })
    }

    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.receipt_timeout_seconds)
    }
}
