//! Revert reason decoding for the standard Solidity `Error(string)` payload, plus the
//! best-effort extraction of such payloads from node error text.

/// `bytes4(keccak256("Error(string)"))`
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const WORD: usize = 32;
const EXECUTION_REVERTED: &str = "execution reverted";

/// Decode an ABI-encoded `Error(string)` revert payload.
///
/// Returns an empty string when the input is absent, not hex, too short, or carries any
/// other selector. Never fails.
pub fn decode_revert_reason(data_hex: Option<&str>) -> String {
    let Some(s) = data_hex.map(str::trim).filter(|s| !s.is_empty()) else {
        return String::new();
    };
    let s = s.strip_prefix("0x").unwrap_or(s);
    let Ok(bytes) = hex::decode(s) else {
        return String::new();
    };
    decode_revert_bytes(&bytes)
}

pub fn decode_revert_bytes(bytes: &[u8]) -> String {
    let Some((selector, rest)) = bytes.split_first_chunk::<4>() else {
        return String::new();
    };
    if *selector != ERROR_STRING_SELECTOR {
        return String::new();
    }
    // rest = offset word | length word | string bytes
    let Some(len_word) = rest.get(WORD..2 * WORD) else {
        return String::new();
    };
    let Some(len) = word_to_len(len_word) else {
        return String::new();
    };
    let body = rest.get(2 * WORD..).unwrap_or_default();
    let end = len.min(body.len());
    body.get(..end)
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}

/// Big-endian 32-byte word to a length. Lengths that do not fit `usize` saturate, which the
/// caller clamps to the available bytes anyway.
fn word_to_len(word: &[u8]) -> Option<usize> {
    let (high, low) = word.split_at_checked(WORD - 8)?;
    let low: [u8; 8] = low.try_into().ok()?;
    if high.iter().any(|b| *b != 0) {
        return Some(usize::MAX);
    }
    Some(usize::try_from(u64::from_be_bytes(low)).unwrap_or(usize::MAX))
}

/// Scan whitespace-separated tokens of an error message for hex payloads (`0x` followed by
/// more than eight characters) and return the first one that decodes to a reason.
pub fn decode_from_error_text(msg: &str) -> Option<String> {
    msg.split_whitespace()
        .map(trim_token)
        .filter(|part| part.starts_with("0x") && part.len() > 10)
        .map(|part| decode_revert_reason(Some(part)))
        .find(|r| !r.is_empty())
}

// Node clients wrap payloads in quotes, brackets or trailing punctuation.
fn trim_token(part: &str) -> &str {
    part.trim_matches(|c: char| !c.is_ascii_alphanumeric())
}

/// Revert reason for a failed `eth_call`: a decoded payload, else the message from
/// "execution reverted" onwards, else the whole message.
pub fn reason_from_call_error(msg: &str) -> String {
    if let Some(r) = decode_from_error_text(msg) {
        return r;
    }
    match msg.find(EXECUTION_REVERTED) {
        Some(idx) => msg.get(idx..).unwrap_or(msg).to_owned(),
        None => msg.to_owned(),
    }
}

/// Revert reason for a failed `eth_estimateGas`: a decoded payload, else the message when it
/// reports a revert, else nothing (estimation fails for many non-revert reasons).
pub fn reason_from_estimate_error(msg: &str) -> String {
    if let Some(r) = decode_from_error_text(msg) {
        return r;
    }
    if msg.contains(EXECUTION_REVERTED) {
        msg.to_owned()
    } else {
        String::new()
    }
}

/// Operator guidance for well-known revert reasons.
pub fn operator_hint(reason: &str) -> Option<&'static str> {
    let r = reason.to_lowercase();
    if r.contains("transfer to the zero address") {
        return Some(
            "the route transfers to 0x000..0: check the configured token addresses are real \
             (not placeholders) and that the quote does not target the zero address",
        );
    }
    if r.contains("insufficient") && (r.contains("output") || r.contains("amount")) {
        return Some("output below minimum: retry with a fresh quote or a larger slippage");
    }
    if r.contains("transfer amount exceeds balance") || r.contains("insufficient balance") {
        return Some("the sending account does not hold enough of the input token");
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// ABI-encode `Error(string)` the way Solidity does.
    pub(crate) fn encode_error_string(reason: &str) -> String {
        let mut out = ERROR_STRING_SELECTOR.to_vec();
        let mut offset = [0_u8; WORD];
        offset[WORD - 1] = 0x20;
        out.extend_from_slice(&offset);
        let mut len = [0_u8; WORD];
        let n = u64::try_from(reason.len()).unwrap_or(0).to_be_bytes();
        len[WORD - 8..].copy_from_slice(&n);
        out.extend_from_slice(&len);
        out.extend_from_slice(reason.as_bytes());
        let pad = (WORD - reason.len() % WORD) % WORD;
        out.extend(std::iter::repeat_n(0_u8, pad));
        format!("0x{}", hex::encode(out))
    }

    #[test]
    fn decodes_error_string_payload() {
        let payload = encode_error_string("Insufficient balance");
        assert_eq!(
            decode_revert_reason(Some(&payload)),
            "Insufficient balance"
        );
        // Prefix is optional.
        let bare = payload.trim_start_matches("0x");
        assert_eq!(decode_revert_reason(Some(bare)), "Insufficient balance");
    }

    #[test]
    fn decodes_real_router_revert() {
        let data = "0x08c379a000000000000000000000000000000000000000000000000000000000000000200000000000000000000000000000000000000000000000000000000000000025556e697377617056323a20494e53554646494349454e545f4f55545055545f414d4f554e54000000000000000000000000000000000000000000000000000000";
        assert_eq!(
            decode_revert_reason(Some(data)),
            "UniswapV2: INSUFFICIENT_OUTPUT_AMOUNT"
        );
    }

    #[test]
    fn other_selectors_and_garbage_yield_empty() {
        assert_eq!(decode_revert_reason(None), "");
        assert_eq!(decode_revert_reason(Some("")), "");
        assert_eq!(decode_revert_reason(Some("0x")), "");
        assert_eq!(decode_revert_reason(Some("0xdeadbeef")), "");
        assert_eq!(decode_revert_reason(Some("0x08c379a0")), "");
        assert_eq!(decode_revert_reason(Some("0x08c379a00000")), "");
        assert_eq!(decode_revert_reason(Some("not hex at all")), "");
        assert_eq!(decode_revert_reason(Some("0x123")), "");

        let custom = encode_error_string("x").replacen("08c379a0", "fb8f41b2", 1);
        assert_eq!(decode_revert_reason(Some(&custom)), "");
    }

    #[test]
    fn truncated_string_body_is_clamped() {
        let payload = encode_error_string("Insufficient balance");
        // 0x + selector + offset word + length word + 10 of the 20 string bytes.
        let cut = payload.get(..2 + 8 + 64 + 64 + 20).unwrap_or_default();
        assert_eq!(decode_revert_reason(Some(cut)), "Insufficie");
    }

    #[test]
    fn huge_length_word_does_not_panic() {
        let mut payload = encode_error_string("abc");
        // Overwrite the length word with all ones.
        let start = 2 + 8 + 64;
        payload.replace_range(start..start + 64, &"f".repeat(64));
        let r = decode_revert_reason(Some(&payload));
        assert!(r.starts_with("abc"), "unexpected reason {r:?}");
    }

    #[test]
    fn scans_error_text_for_payload_tokens() {
        let payload = encode_error_string("STF");
        let msg = format!(
            "server returned an error response: error code 3: execution reverted, data: \"{payload}\""
        );
        assert_eq!(decode_from_error_text(&msg), Some("STF".to_owned()));
        assert_eq!(reason_from_call_error(&msg), "STF");
        assert_eq!(reason_from_estimate_error(&msg), "STF");
    }

    #[test]
    fn short_hex_tokens_are_ignored() {
        // Addresses decode to nothing; selectors alone are too short to be considered.
        let msg = "call to 0x08c379a0 from 0x0000000000000000000000000000000000000001 failed";
        assert_eq!(decode_from_error_text(msg), None);
    }

    #[test]
    fn call_error_falls_back_to_execution_reverted_suffix_then_raw() {
        let msg = "rpc error: execution reverted: Too little received";
        assert_eq!(
            reason_from_call_error(msg),
            "execution reverted: Too little received"
        );
        assert_eq!(reason_from_call_error("timeout"), "timeout");
    }

    #[test]
    fn estimate_error_only_keeps_reverts() {
        assert_eq!(
            reason_from_estimate_error("execution reverted"),
            "execution reverted"
        );
        assert_eq!(reason_from_estimate_error("insufficient funds for gas"), "");
    }

    #[test]
    fn hints_for_zero_address_transfers() {
        assert!(operator_hint("ERC20: transfer to the zero address").is_some());
        assert!(operator_hint("Ownable: caller is not the owner").is_none());
    }
}
