use alloy::primitives::B256;
use thiserror::Error;

/// Failure of a single swap attempt.
///
/// Every variant is attempt-scoped: the driver logs it and moves on to the next attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error("invalid numeric encoding: {0}")]
    InvalidNumericEncoding(String),

    #[error("transaction descriptor has no destination address")]
    MissingDestination,

    #[error("invalid destination address: {0}")]
    InvalidDestination(String),

    #[error("invalid calldata: {0}")]
    InvalidCalldata(String),

    #[error("simulation reverted: {reason}")]
    SimulationRevert { reason: String },

    #[error("{}", gas_unavailable_message(.revert_reason.as_deref()))]
    GasUnavailable { revert_reason: Option<String> },

    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("quote response contains no transactions")]
    NoTransactions,

    #[error("node request failed: {0}")]
    Node(String),

    #[error("submission failed: {0}")]
    SubmissionFailure(String),

    #[error("transaction {tx_hash} failed on-chain (status 0, block {block_number:?})")]
    ReceiptFailure {
        tx_hash: B256,
        block_number: Option<u64>,
    },
}

fn gas_unavailable_message(reason: Option<&str>) -> String {
    match reason {
        Some(r) => format!("no gas estimate and no gas hint available: {r}"),
        None => "no gas estimate and no gas hint available".to_owned(),
    }
}

impl AttemptError {
    /// Stable identifier for logs and JSON output.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidNumericEncoding(_) => "invalid_numeric_encoding",
            Self::MissingDestination => "missing_destination",
            Self::InvalidDestination(_) => "invalid_destination",
            Self::InvalidCalldata(_) => "invalid_calldata",
            Self::SimulationRevert { .. } => "simulation_revert",
            Self::GasUnavailable { .. } => "gas_unavailable",
            Self::QuoteUnavailable(_) => "quote_unavailable",
            Self::NoTransactions => "no_transactions",
            Self::Node(_) => "node_error",
            Self::SubmissionFailure(_) => "submission_failure",
            Self::ReceiptFailure { .. } => "receipt_failure",
        }
    }

    pub(crate) fn node(context: &str, e: &eyre::Report) -> Self {
        Self::Node(format!("{context}: {e:#}"))
    }
}
