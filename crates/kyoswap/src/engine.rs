//! One preparation pass: quote descriptor in, signable transaction out.

use crate::descriptor::normalize_descriptor;
use crate::errors::AttemptError;
use crate::fees::{resolve_fee_strategy, ONE_GWEI};
use crate::finalize::{finalize, FinalTransaction};
use crate::gas::{candidate_request, decide_gas, simulate_and_estimate, GasBuffer, SimulationOutcome};
use crate::node::ChainNode;
use crate::revert;
use alloy::primitives::Address;
use serde_json::Value;

/// Knobs for a preparation pass. Built from configuration by the caller; the engine never
/// reads the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub gas_buffer: GasBuffer,
    pub priority_fee_per_gas: u128,
    pub abort_on_simulation_revert: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            gas_buffer: GasBuffer::default(),
            priority_fee_per_gas: ONE_GWEI,
            abort_on_simulation_revert: false,
        }
    }
}

/// Result of a successful preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub simulation: SimulationOutcome,
    pub tx: FinalTransaction,
}

impl Prepared {
    /// Revert reason seen during simulation, if any, even though preparation went ahead.
    pub fn simulation_revert(&self) -> Option<&str> {
        self.simulation.revert_reason()
    }
}

#[derive(Debug)]
pub struct Preparer<'a, N> {
    node: &'a N,
    from: Address,
    settings: EngineSettings,
}

impl<'a, N: ChainNode> Preparer<'a, N> {
    pub const fn new(node: &'a N, from: Address, settings: EngineSettings) -> Self {
        Self {
            node,
            from,
            settings,
        }
    }

    pub async fn prepare(&self, descriptor: &Value) -> Result<Prepared, AttemptError> {
        let intent = normalize_descriptor(descriptor)?;

        let candidate = candidate_request(self.from, &intent);
        let simulation = simulate_and_estimate(self.node, &candidate).await;
        if let Some(reason) = simulation.revert_reason() {
            tracing::warn!(reason, hint = revert::operator_hint(reason), "simulation reverted");
            if self.settings.abort_on_simulation_revert {
                return Err(AttemptError::SimulationRevert {
                    reason: reason.to_owned(),
                });
            }
        }

        let gas = decide_gas(&simulation, intent.gas_hint, self.settings.gas_buffer)?;
        let fee =
            resolve_fee_strategy(self.node, &intent, self.settings.priority_fee_per_gas).await?;
        tracing::info!(
            gas,
            estimated = ?simulation.estimated_gas,
            hint = ?intent.gas_hint,
            fee_model = fee.kind(),
            "gas and fees resolved"
        );

        let tx = finalize(self.node, self.from, &intent, gas, fee).await?;
        Ok(Prepared { simulation, tx })
    }
}
