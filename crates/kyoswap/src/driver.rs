//! The swap loop: quote, prepare, then preview or submit, once per iteration.

use crate::cli_output;
use crate::config::SwapConfig;
use crate::engine::{EngineSettings, Preparer};
use crate::errors::AttemptError;
use crate::node::{ChainNode, ReceiptSummary};
use crate::quote::{first_descriptor, route_request, RouteSource};
use crate::submit::submit;
use alloy::{
    primitives::{
        utils::{format_ether, format_units},
        Address, U256,
    },
    signers::local::PrivateKeySigner,
};
use eyre::Context as _;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::Duration;

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPlan {
    pub amount_wei: U256,
    pub loops: u32,
    pub slippage: Decimal,
    pub dry_run: bool,
}

impl SwapPlan {
    /// Reject a plan that cannot start with the current native `balance`.
    pub fn validate(&self, balance: U256) -> eyre::Result<()> {
        if self.amount_wei.is_zero() {
            eyre::bail!("amount must be greater than zero");
        }
        if self.loops == 0 {
            eyre::bail!("loop count must be greater than zero");
        }
        if self.amount_wei > balance {
            eyre::bail!(
                "insufficient native balance: need {}, have {}",
                format_ether(self.amount_wei),
                format_ether(balance)
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balances {
    pub native: U256,
    /// Raw amount and decimals; `None` when the token could not be read.
    pub usdc: Option<(U256, u8)>,
}

impl Balances {
    pub fn native_display(&self) -> String {
        format_ether(self.native)
    }

    pub fn usdc_display(&self) -> Option<String> {
        self.usdc.and_then(|(v, d)| format_units(v, d).ok())
    }

    pub fn to_json(&self, owner: Address) -> Value {
        json!({
            "address": owner.to_checksum(None),
            "native_wei": self.native.to_string(),
            "native": self.native_display(),
            "usdc_raw": self.usdc.map(|(v, _)| v.to_string()),
            "usdc": self.usdc_display(),
        })
    }

    pub fn print(&self) {
        cli_output::print_balances(&self.native_display(), self.usdc_display().as_deref());
    }
}

/// Native balance plus USDC. A USDC read failure is logged, not returned.
pub async fn read_balances<N: ChainNode>(
    node: &N,
    owner: Address,
    usdc: Address,
) -> eyre::Result<Balances> {
    let native = node.balance(owner).await.context("get native balance")?;
    let usdc = match node.token_balance(usdc, owner).await {
        Ok(b) => Some(b),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), %usdc, "usdc balance unavailable");
            None
        }
    };
    Ok(Balances { native, usdc })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Dry run: the transaction that would have been signed.
    Previewed(Value),
    Confirmed(ReceiptSummary),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub planned: u32,
    pub attempted: u32,
    pub successful: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub engine: EngineSettings,
    pub native_placeholder: Address,
    pub usdc: Address,
    pub expected_router: Option<Address>,
    pub receipt_timeout: Duration,
    pub delay_between_swaps: Duration,
    pub delay_after_failure: Duration,
}

impl DriverSettings {
    pub fn from_config(cfg: &SwapConfig) -> eyre::Result<Self> {
        Ok(Self {
            engine: cfg.engine_settings()?,
            native_placeholder: cfg.native_placeholder()?,
            usdc: cfg.usdc_address()?,
            expected_router: cfg.expected_router()?,
            receipt_timeout: cfg.receipt_timeout(),
            delay_between_swaps: Duration::from_secs(cfg.driver.delay_between_swaps_seconds),
            delay_after_failure: Duration::from_secs(cfg.driver.delay_after_failure_seconds),
        })
    }
}

#[derive(Debug)]
pub struct Driver<'a, N, R> {
    node: &'a N,
    routes: &'a R,
    signer: &'a PrivateKeySigner,
    settings: DriverSettings,
}

impl<'a, N: ChainNode, R: RouteSource> Driver<'a, N, R> {
    pub const fn new(
        node: &'a N,
        routes: &'a R,
        signer: &'a PrivateKeySigner,
        settings: DriverSettings,
    ) -> Self {
        Self {
            node,
            routes,
            signer,
            settings,
        }
    }

    fn owner(&self) -> Address {
        self.signer.address()
    }

    pub async fn balances(&self) -> eyre::Result<Balances> {
        read_balances(self.node, self.owner(), self.settings.usdc).await
    }

    /// One swap: fetch a route, prepare it, then preview or submit it.
    pub async fn attempt(&self, plan: &SwapPlan) -> Result<AttemptOutcome, AttemptError> {
        let request = route_request(
            self.owner(),
            self.settings.native_placeholder,
            self.settings.usdc,
            plan.amount_wei,
            plan.slippage,
        )?;
        let response = self.routes.route(&request).await?;
        let descriptor = first_descriptor(&response)?;

        let prepared = Preparer::new(self.node, self.owner(), self.settings.engine)
            .prepare(descriptor)
            .await?;
        let tx = &prepared.tx;
        if let Some(router) = self.settings.expected_router {
            if tx.to != router {
                tracing::warn!(to = %tx.to, expected = %router, "route targets an unexpected contract");
            }
        }
        tracing::info!(
            to = %tx.to,
            value = %tx.value,
            gas = tx.gas,
            nonce = tx.nonce,
            fee_model = tx.fee.kind(),
            "transaction prepared"
        );

        if plan.dry_run {
            return Ok(AttemptOutcome::Previewed(tx.to_json()));
        }
        let receipt = submit(self.node, self.signer, tx, self.settings.receipt_timeout).await?;
        Ok(AttemptOutcome::Confirmed(receipt))
    }

    /// Run `plan.loops` attempts. Attempt failures are logged and the loop moves on; the run
    /// stops early only when the balance no longer covers the amount.
    pub async fn run(&self, plan: &SwapPlan) -> eyre::Result<RunReport> {
        let mut report = RunReport {
            planned: plan.loops,
            ..RunReport::default()
        };
        for n in 1..=plan.loops {
            cli_output::stderr_writeln(&format!("\nSwap {n} of {}", plan.loops));
            let balance = self
                .node
                .balance(self.owner())
                .await
                .context("get native balance")?;
            if plan.amount_wei > balance {
                tracing::warn!(
                    need = %plan.amount_wei,
                    have = %balance,
                    "native balance too low; stopping"
                );
                cli_output::stderr_writeln(&format!(
                    "Insufficient balance: need {}, have {}",
                    format_ether(plan.amount_wei),
                    format_ether(balance)
                ));
                break;
            }

            report.attempted += 1;
            match self.attempt(plan).await {
                Ok(AttemptOutcome::Previewed(preview)) => {
                    cli_output::stderr_writeln("Dry run: transaction not sent.");
                    cli_output::print_json(&preview)?;
                    report.successful += 1;
                }
                Ok(AttemptOutcome::Confirmed(r)) => {
                    cli_output::stderr_writeln(&format!(
                        "Swap confirmed: {} (block {}, gas used {})",
                        r.tx_hash,
                        r.block_number.map_or_else(|| "?".to_owned(), |b| b.to_string()),
                        r.gas_used
                    ));
                    report.successful += 1;
                    match self.balances().await {
                        Ok(b) => b.print(),
                        Err(e) => tracing::warn!(error = %format!("{e:#}"), "balance refresh failed"),
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt = n, code = e.code(), error = %e, "swap attempt failed");
                    cli_output::stderr_writeln(&format!("Swap {n} failed: {e}"));
                    tokio::time::sleep(self.settings.delay_after_failure).await;
                    continue;
                }
            }
            if n < plan.loops {
                tokio::time::sleep(self.settings.delay_between_swaps).await;
            }
        }
        cli_output::stderr_writeln(&format!(
            "\nDone: {} successful of {}",
            report.successful, report.planned
        ));
        Ok(report)
    }
}

/// Fetch one route and show both the raw descriptor and its normalized form.
pub async fn describe_route<R: RouteSource>(routes: &R, request: &Value) -> eyre::Result<Value> {
    let response = routes.route(request).await?;
    let descriptor = first_descriptor(&response)?;
    let intent = crate::descriptor::normalize_descriptor(descriptor)?;
    Ok(json!({
        "request": request,
        "descriptor": descriptor,
        "intent": intent.to_json(),
    }))
}
