//! Signing, broadcast and receipt handling for a prepared transaction.

use crate::errors::AttemptError;
use crate::fees::FeeStrategy;
use crate::finalize::FinalTransaction;
use crate::node::{ChainNode, ReceiptSummary};
use crate::revert;
use alloy::{
    consensus::{SignableTransaction as _, TxEip1559, TxEnvelope, TxLegacy},
    eips::{eip2718::Encodable2718 as _, eip2930::AccessList},
    primitives::{TxKind, B256},
    signers::{local::PrivateKeySigner, SignerSync as _},
};
use eyre::Context as _;
use secrecy::{ExposeSecret as _, SecretString};
use std::str::FromStr as _;
use std::time::Duration;

/// Parse a hex private key (with or without `0x`).
pub fn signer_from_secret(key: &SecretString) -> eyre::Result<PrivateKeySigner> {
    PrivateKeySigner::from_str(key.expose_secret().trim()).context("parse private key")
}

/// Sign `tx`, returning the EIP-2718 encoded bytes and the transaction hash.
pub fn sign_transaction(
    signer: &PrivateKeySigner,
    tx: &FinalTransaction,
) -> eyre::Result<(Vec<u8>, B256)> {
    let (envelope, tx_hash) = match tx.fee {
        FeeStrategy::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let unsigned = TxEip1559 {
                chain_id: tx.chain_id,
                nonce: tx.nonce,
                gas_limit: tx.gas,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to: TxKind::Call(tx.to),
                value: tx.value,
                input: tx.data.clone(),
                access_list: AccessList::default(),
            };
            let sig = signer
                .sign_hash_sync(&unsigned.signature_hash())
                .context("sign eip1559")?;
            let signed = unsigned.into_signed(sig);
            let hash = *signed.hash();
            (TxEnvelope::Eip1559(signed), hash)
        }
        FeeStrategy::Legacy { gas_price } => {
            let unsigned = TxLegacy {
                chain_id: Some(tx.chain_id),
                nonce: tx.nonce,
                gas_price,
                gas_limit: tx.gas,
                to: TxKind::Call(tx.to),
                value: tx.value,
                input: tx.data.clone(),
            };
            let sig = signer
                .sign_hash_sync(&unsigned.signature_hash())
                .context("sign legacy")?;
            let signed = unsigned.into_signed(sig);
            let hash = *signed.hash();
            (TxEnvelope::Legacy(signed), hash)
        }
    };
    Ok((envelope.encoded_2718(), tx_hash))
}

fn submission_failure(context: &str, e: &eyre::Report) -> AttemptError {
    let msg = format!("{e:#}");
    match revert::decode_from_error_text(&msg) {
        Some(reason) => AttemptError::SubmissionFailure(format!("{context}: reverted: {reason}")),
        None => AttemptError::SubmissionFailure(format!("{context}: {msg}")),
    }
}

/// Sign, broadcast and wait for the receipt. Success means status 1.
pub async fn submit<N: ChainNode>(
    node: &N,
    signer: &PrivateKeySigner,
    tx: &FinalTransaction,
    receipt_timeout: Duration,
) -> Result<ReceiptSummary, AttemptError> {
    let (raw, tx_hash) =
        sign_transaction(signer, tx).map_err(|e| submission_failure("sign", &e))?;

    let sent = node
        .send_raw_transaction(&raw)
        .await
        .map_err(|e| submission_failure("broadcast", &e))?;
    if sent != tx_hash {
        tracing::warn!(%sent, %tx_hash, "node returned a different transaction hash");
    }
    tracing::info!(%tx_hash, "transaction broadcast; waiting for receipt");

    let receipt = node
        .wait_for_receipt(tx_hash, receipt_timeout)
        .await
        .map_err(|e| AttemptError::node("wait for receipt", &e))?;
    if !receipt.success {
        return Err(AttemptError::ReceiptFailure {
            tx_hash,
            block_number: receipt.block_number,
        });
    }
    tracing::info!(
        %tx_hash,
        block = ?receipt.block_number,
        gas_used = receipt.gas_used,
        "transaction confirmed"
    );
    Ok(receipt)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gas::tests::ScriptedNode;
    use crate::revert::tests::encode_error_string;
    use alloy::primitives::{keccak256, Address, Bytes, U256};

    // Well-known development key (anvil account 1).
    pub(crate) const DEV_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn signer() -> eyre::Result<PrivateKeySigner> {
        signer_from_secret(&SecretString::from(DEV_KEY.to_owned()))
    }

    fn tx(fee: FeeStrategy) -> FinalTransaction {
        FinalTransaction {
            to: Address::repeat_byte(0x42),
            value: U256::from(10_u64),
            gas: 21_000,
            data: Bytes::from(vec![0x01_u8]),
            nonce: 5,
            chain_id: 1329,
            fee,
        }
    }

    #[test]
    fn key_parses_with_or_without_prefix() -> eyre::Result<()> {
        let expected = Address::from_str("0x70997970C51812dc3A010C7d01b50e0d17dc79C8")?;
        assert_eq!(signer()?.address(), expected);
        let bare = SecretString::from(DEV_KEY.trim_start_matches("0x").to_owned());
        assert_eq!(signer_from_secret(&bare)?.address(), expected);
        assert!(signer_from_secret(&SecretString::from("nope".to_owned())).is_err());
        Ok(())
    }

    #[test]
    fn typed_and_legacy_encodings_hash_to_tx_hash() -> eyre::Result<()> {
        let s = signer()?;
        let (raw, hash) = sign_transaction(
            &s,
            &tx(FeeStrategy::Eip1559 {
                max_fee_per_gas: 50,
                max_priority_fee_per_gas: 2,
            }),
        )?;
        assert_eq!(raw.first(), Some(&0x02_u8), "expected EIP-1559 type byte");
        assert_eq!(keccak256(&raw), hash);

        let (raw, hash) = sign_transaction(&s, &tx(FeeStrategy::Legacy { gas_price: 30 }))?;
        assert!(raw.first().is_some_and(|b| *b >= 0xc0), "expected rlp list");
        assert_eq!(keccak256(&raw), hash);
        Ok(())
    }

    #[tokio::test]
    async fn confirmed_receipt_is_success() -> eyre::Result<()> {
        let node = ScriptedNode {
            receipt_success: true,
            ..ScriptedNode::default()
        };
        let r = submit(
            &node,
            &signer()?,
            &tx(FeeStrategy::Legacy { gas_price: 1 }),
            Duration::from_secs(1),
        )
        .await?;
        assert!(r.success);
        assert_eq!(r.block_number, Some(100));
        assert_eq!(node.recorded(), vec!["send_raw_transaction", "wait_for_receipt"]);
        Ok(())
    }

    #[tokio::test]
    async fn status_zero_is_receipt_failure() -> eyre::Result<()> {
        let node = ScriptedNode::default();
        let err = submit(
            &node,
            &signer()?,
            &tx(FeeStrategy::Legacy { gas_price: 1 }),
            Duration::from_secs(1),
        )
        .await
        .err();
        assert!(
            matches!(
                err,
                Some(AttemptError::ReceiptFailure {
                    block_number: Some(100),
                    ..
                })
            ),
            "got {err:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn broadcast_revert_is_decoded() -> eyre::Result<()> {
        let payload = encode_error_string("ERC20: transfer to the zero address");
        let node = ScriptedNode {
            send_err: Some(format!("eth_sendRawTransaction: execution reverted revert data: {payload}")),
            ..ScriptedNode::default()
        };
        let err = submit(
            &node,
            &signer()?,
            &tx(FeeStrategy::Legacy { gas_price: 1 }),
            Duration::from_secs(1),
        )
        .await
        .err();
        assert_eq!(
            err,
            Some(AttemptError::SubmissionFailure(
                "broadcast: reverted: ERC20: transfer to the zero address".to_owned()
            ))
        );
        assert_eq!(node.recorded(), vec!["send_raw_transaction"]);
        Ok(())
    }

    #[tokio::test]
    async fn broadcast_error_without_payload_keeps_text() -> eyre::Result<()> {
        let node = ScriptedNode {
            send_err: Some("nonce too low".to_owned()),
            ..ScriptedNode::default()
        };
        let err = submit(
            &node,
            &signer()?,
            &tx(FeeStrategy::Legacy { gas_price: 1 }),
            Duration::from_secs(1),
        )
        .await
        .err();
        assert_eq!(
            err,
            Some(AttemptError::SubmissionFailure(
                "broadcast: nonce too low".to_owned()
            ))
        );
        Ok(())
    }
}
