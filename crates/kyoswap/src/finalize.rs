//! Final, signable transaction assembly.

use crate::descriptor::TransactionIntent;
use crate::errors::AttemptError;
use crate::fees::FeeStrategy;
use crate::node::ChainNode;
use alloy::primitives::{Address, Bytes, U256};
use serde_json::{json, Value};

/// Fully determined transaction, built fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalTransaction {
    pub to: Address,
    pub value: U256,
    pub gas: u64,
    pub data: Bytes,
    pub nonce: u64,
    pub chain_id: u64,
    pub fee: FeeStrategy,
}

impl FinalTransaction {
    /// Compose from resolved parts. No validation happens here.
    pub fn assemble(
        intent: &TransactionIntent,
        gas: u64,
        fee: FeeStrategy,
        nonce: u64,
        chain_id: u64,
    ) -> Self {
        Self {
            to: intent.to,
            value: intent.value,
            gas,
            data: intent.data.clone(),
            nonce,
            chain_id,
            fee,
        }
    }

    /// Preview for dry runs and logs. Quantities are decimal strings.
    pub fn to_json(&self) -> Value {
        let mut v = json!({
            "to": format!("{:#x}", self.to),
            "value": self.value.to_string(),
            "gas": self.gas,
            "data": self.data.to_string(),
            "nonce": self.nonce,
            "chainId": self.chain_id,
        });
        if let Some(obj) = v.as_object_mut() {
            match self.fee {
                FeeStrategy::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                } => {
                    obj.insert("type".into(), json!(2));
                    obj.insert("maxFeePerGas".into(), json!(max_fee_per_gas.to_string()));
                    obj.insert(
                        "maxPriorityFeePerGas".into(),
                        json!(max_priority_fee_per_gas.to_string()),
                    );
                }
                FeeStrategy::Legacy { gas_price } => {
                    obj.insert("type".into(), json!(0));
                    obj.insert("gasPrice".into(), json!(gas_price.to_string()));
                }
            }
        }
        v
    }
}

/// Fetch nonce and chain id from the node and assemble. Both are read fresh on every call.
pub async fn finalize<N: ChainNode>(
    node: &N,
    from: Address,
    intent: &TransactionIntent,
    gas: u64,
    fee: FeeStrategy,
) -> Result<FinalTransaction, AttemptError> {
    let nonce = node
        .transaction_count(from)
        .await
        .map_err(|e| AttemptError::node("get nonce", &e))?;
    let chain_id = node
        .chain_id()
        .await
        .map_err(|e| AttemptError::node("get chain id", &e))?;
    Ok(FinalTransaction::assemble(intent, gas, fee, nonce, chain_id))
}
