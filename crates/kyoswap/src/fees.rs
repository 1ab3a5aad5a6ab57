//! Fee strategy selection: quoted fees first, then chain-derived EIP-1559, then legacy.

use crate::descriptor::TransactionIntent;
use crate::errors::AttemptError;
use crate::node::ChainNode;
use alloy::rpc::types::BlockNumberOrTag;

pub const ONE_GWEI: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeStrategy {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

impl FeeStrategy {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Eip1559 { .. } => "eip1559",
            Self::Legacy { .. } => "legacy",
        }
    }
}

/// `max_fee = 2 * base_fee + priority`: room for a couple of blocks of base fee growth.
pub const fn eip1559_from_base_fee(base_fee: u128, priority_fee: u128) -> FeeStrategy {
    FeeStrategy::Eip1559 {
        max_fee_per_gas: base_fee.saturating_mul(2).saturating_add(priority_fee),
        max_priority_fee_per_gas: priority_fee,
    }
}

/// Base fee of the pending block, falling back to the latest block. `None` means the chain
/// shows no sign of EIP-1559 (or no block could be read at all).
pub async fn detect_base_fee<N: ChainNode>(node: &N) -> Option<u128> {
    match node.block_fees(BlockNumberOrTag::Pending).await {
        Ok(Some(b)) => {
            tracing::debug!(block = b.number, base_fee = ?b.base_fee_per_gas, "pending block");
            return b.base_fee_per_gas;
        }
        Ok(None) => tracing::debug!("no pending block; checking latest"),
        Err(e) => tracing::debug!(error = %format!("{e:#}"), "pending block unavailable; checking latest"),
    }
    match node.block_fees(BlockNumberOrTag::Latest).await {
        Ok(b) => b.and_then(|b| b.base_fee_per_gas),
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "latest block unavailable; assuming legacy fees");
            None
        }
    }
}

/// Decide the fee strategy for one transaction.
///
/// Order matters: fees supplied by the quote are authoritative and the chain is only
/// consulted when the quote is silent.
pub async fn resolve_fee_strategy<N: ChainNode>(
    node: &N,
    intent: &TransactionIntent,
    priority_fee: u128,
) -> Result<FeeStrategy, AttemptError> {
    if let Some((max_fee_per_gas, max_priority_fee_per_gas)) = intent.eip1559_fees() {
        return Ok(FeeStrategy::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        });
    }
    if let Some(gas_price) = intent.gas_price {
        return Ok(FeeStrategy::Legacy { gas_price });
    }
    if let Some(base_fee) = detect_base_fee(node).await {
        return Ok(eip1559_from_base_fee(base_fee, priority_fee));
    }
    let gas_price = node
        .gas_price()
        .await
        .map_err(|e| AttemptError::node("get gas price", &e))?;
    Ok(FeeStrategy::Legacy { gas_price })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::tests::ScriptedNode;
    use crate::node::BlockFees;
    use alloy::primitives::{Address, Bytes, U256};

    fn intent(
        max_fee: Option<u128>,
        priority: Option<u128>,
        gas_price: Option<u128>,
    ) -> TransactionIntent {
        TransactionIntent {
            to: Address::repeat_byte(0x42),
            data: Bytes::new(),
            value: U256::ZERO,
            gas_hint: None,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
            gas_price,
        }
    }

    fn london_node() -> ScriptedNode {
        ScriptedNode {
            pending_block: Some(BlockFees {
                number: 10,
                base_fee_per_gas: Some(10 * ONE_GWEI),
            }),
            gas_price: 99,
            ..ScriptedNode::default()
        }
    }

    #[tokio::test]
    async fn quoted_eip1559_fees_are_used_verbatim() -> eyre::Result<()> {
        let node = london_node();
        let s = resolve_fee_strategy(&node, &intent(Some(50), Some(2), Some(30)), ONE_GWEI).await?;
        assert_eq!(
            s,
            FeeStrategy::Eip1559 {
                max_fee_per_gas: 50,
                max_priority_fee_per_gas: 2
            }
        );
        assert!(node.recorded().is_empty(), "node must not be consulted");
        Ok(())
    }

    #[tokio::test]
    async fn quoted_gas_price_beats_chain_detection() -> eyre::Result<()> {
        let node = london_node();
        let s = resolve_fee_strategy(&node, &intent(None, None, Some(30)), ONE_GWEI).await?;
        assert_eq!(s, FeeStrategy::Legacy { gas_price: 30 });
        assert!(node.recorded().is_empty(), "node must not be consulted");
        Ok(())
    }

    #[tokio::test]
    async fn half_eip1559_quote_falls_through_to_gas_price() -> eyre::Result<()> {
        let node = london_node();
        let s = resolve_fee_strategy(&node, &intent(Some(50), None, Some(30)), ONE_GWEI).await?;
        assert_eq!(s, FeeStrategy::Legacy { gas_price: 30 });
        Ok(())
    }

    #[tokio::test]
    async fn chain_base_fee_derives_eip1559() -> eyre::Result<()> {
        let node = london_node();
        let s = resolve_fee_strategy(&node, &intent(None, None, None), ONE_GWEI).await?;
        assert_eq!(
            s,
            FeeStrategy::Eip1559 {
                max_fee_per_gas: 21 * ONE_GWEI,
                max_priority_fee_per_gas: ONE_GWEI
            }
        );
        assert_eq!(node.recorded(), vec!["block_fees"]);
        Ok(())
    }

    #[tokio::test]
    async fn latest_block_is_checked_when_pending_fails() -> eyre::Result<()> {
        let node = ScriptedNode {
            pending_err: true,
            latest_block: Some(BlockFees {
                number: 9,
                base_fee_per_gas: Some(7),
            }),
            ..ScriptedNode::default()
        };
        let s = resolve_fee_strategy(&node, &intent(None, None, None), 1).await?;
        assert_eq!(
            s,
            FeeStrategy::Eip1559 {
                max_fee_per_gas: 15,
                max_priority_fee_per_gas: 1
            }
        );
        assert_eq!(node.recorded(), vec!["block_fees", "block_fees"]);
        Ok(())
    }

    #[tokio::test]
    async fn legacy_chain_uses_node_gas_price() -> eyre::Result<()> {
        let node = ScriptedNode {
            pending_block: Some(BlockFees {
                number: 3,
                base_fee_per_gas: None,
            }),
            gas_price: 5 * ONE_GWEI,
            ..ScriptedNode::default()
        };
        let s = resolve_fee_strategy(&node, &intent(None, None, None), ONE_GWEI).await?;
        assert_eq!(
            s,
            FeeStrategy::Legacy {
                gas_price: 5 * ONE_GWEI
            }
        );
        assert_eq!(node.recorded(), vec!["block_fees", "gas_price"]);
        Ok(())
    }

    #[test]
    fn derived_max_fee_saturates() {
        assert_eq!(
            eip1559_from_base_fee(u128::MAX, 1),
            FeeStrategy::Eip1559 {
                max_fee_per_gas: u128::MAX,
                max_priority_fee_per_gas: 1
            }
        );
    }
}
