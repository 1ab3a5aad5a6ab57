//! Simulate-then-estimate gas resolution.

use crate::descriptor::TransactionIntent;
use crate::errors::AttemptError;
use crate::node::ChainNode;
use crate::revert;
use alloy::{
    network::TransactionBuilder as _,
    primitives::Address,
    rpc::types::{BlockNumberOrTag, TransactionRequest},
};
use rust_decimal::{prelude::ToPrimitive as _, Decimal};

/// Safety multiplier applied to gas figures, rounding up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasBuffer(Decimal);

impl GasBuffer {
    pub fn new(multiplier: Decimal) -> eyre::Result<Self> {
        if multiplier <= Decimal::ZERO {
            eyre::bail!("gas buffer multiplier must be positive (got {multiplier})");
        }
        Ok(Self(multiplier))
    }

    pub const fn multiplier(self) -> Decimal {
        self.0
    }

    /// `ceil(gas * multiplier)`, saturating at `u64::MAX`.
    pub fn apply(self, gas: u64) -> u64 {
        Decimal::from(gas)
            .checked_mul(self.0)
            .map(|d| d.ceil())
            .and_then(|d| d.to_u64())
            .unwrap_or(u64::MAX)
    }
}

impl Default for GasBuffer {
    fn default() -> Self {
        // 1.2
        Self(Decimal::new(12, 1))
    }
}

/// What simulation and estimation learned about the candidate transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    /// `None` iff estimation failed.
    pub estimated_gas: Option<u64>,
    /// Empty iff no reason was found.
    pub revert_reason: String,
}

impl SimulationOutcome {
    pub fn revert_reason(&self) -> Option<&str> {
        Some(self.revert_reason.as_str()).filter(|r| !r.is_empty())
    }
}

/// The request used for both simulation and estimation.
pub fn candidate_request(from: Address, intent: &TransactionIntent) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(intent.to)
        .with_input(intent.data.clone())
        .with_value(intent.value)
}

/// Run `eth_call` then `eth_estimateGas` against `candidate`.
///
/// Failures are not errors here: they become the revert reason. The call's reason wins over
/// the estimator's when both exist.
pub async fn simulate_and_estimate<N: ChainNode>(
    node: &N,
    candidate: &TransactionRequest,
) -> SimulationOutcome {
    let mut outcome = SimulationOutcome::default();

    if let Err(e) = node.call(candidate, BlockNumberOrTag::Latest).await {
        let msg = format!("{e:#}");
        tracing::debug!(error = %msg, "eth_call failed");
        outcome.revert_reason = revert::reason_from_call_error(&msg);
    }

    match node.estimate_gas(candidate).await {
        Ok(gas) if gas > 0 => outcome.estimated_gas = Some(gas),
        Ok(_) => tracing::debug!("node estimated zero gas; treating as failed estimate"),
        Err(e) => {
            let msg = format!("{e:#}");
            tracing::debug!(error = %msg, "eth_estimateGas failed");
            if outcome.revert_reason.is_empty() {
                outcome.revert_reason = revert::reason_from_estimate_error(&msg);
            }
        }
    }

    outcome
}

/// Pick the gas limit from the live estimate and the quote's hint.
///
/// With an estimate the larger of estimate and hint is buffered. Without one a positive hint
/// is buffered. Otherwise there is no safe figure.
pub fn decide_gas(
    outcome: &SimulationOutcome,
    gas_hint: Option<u64>,
    buffer: GasBuffer,
) -> Result<u64, AttemptError> {
    match (outcome.estimated_gas, gas_hint.filter(|g| *g > 0)) {
        (Some(est), hint) => Ok(buffer.apply(est.max(hint.unwrap_or(0)))),
        (None, Some(hint)) => {
            tracing::info!(hint, "gas estimation failed; falling back to quoted gas");
            Ok(buffer.apply(hint))
        }
        (None, None) => Err(AttemptError::GasUnavailable {
            revert_reason: outcome.revert_reason().map(ToOwned::to_owned),
        }),
    }
}
