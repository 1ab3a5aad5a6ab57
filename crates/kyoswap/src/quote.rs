//! Kyoko route API client.

use crate::config::QuoteConfig;
use crate::errors::AttemptError;
use alloy::primitives::{Address, U256};
use eyre::Context as _;
use reqwest::Client;
use rust_decimal::{prelude::ToPrimitive as _, Decimal};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

/// Keys the route response has been seen to list transactions under, in lookup order.
const TRANSACTION_LIST_KEYS: &[&str] = &["transactions", "txs", "transactions_list"];

/// Route request selling exactly `amount_wei` of the native coin for `variable`.
///
/// A negative constraint amount means "spend"; the variable token receives whatever the route
/// yields.
pub fn route_request(
    origin: Address,
    native_placeholder: Address,
    variable: Address,
    amount_wei: U256,
    slippage: Decimal,
) -> Result<Value, AttemptError> {
    let slippage = slippage
        .to_f64()
        .ok_or_else(|| AttemptError::QuoteUnavailable(format!("unrepresentable slippage {slippage}")))?;
    Ok(json!({
        "origin": origin.to_checksum(None),
        "slippage": slippage,
        "constraints": [[native_placeholder.to_checksum(None), format!("-{amount_wei}")]],
        "variable": variable.to_checksum(None),
    }))
}

/// Empty, zero and null values do not claim a key.
fn is_set(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// First descriptor of the transaction list in a route response.
///
/// The first key holding a set value decides; if that value is not a list, the response has no
/// usable transactions even when a later key does.
pub fn first_descriptor(response: &Value) -> Result<&Value, AttemptError> {
    let Some(obj) = response.as_object() else {
        return Err(AttemptError::QuoteUnavailable(
            "route response is not a JSON object".to_owned(),
        ));
    };
    TRANSACTION_LIST_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| is_set(v))
        .and_then(Value::as_array)
        .and_then(|txs| txs.first())
        .ok_or(AttemptError::NoTransactions)
}

/// Where route responses come from.
pub trait RouteSource: Sync {
    fn route(&self, request: &Value) -> impl Future<Output = Result<Value, AttemptError>> + Send;
}

#[derive(Debug, Clone)]
pub struct QuoteClient {
    http: Client,
    api_url: String,
    origin_header: String,
}

impl QuoteClient {
    pub fn new(cfg: &QuoteConfig) -> eyre::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .context("build quote http client")?;
        Ok(Self {
            http,
            api_url: cfg.api_url.trim().to_owned(),
            origin_header: cfg.origin_header.trim().trim_end_matches('/').to_owned(),
        })
    }
}

impl RouteSource for QuoteClient {
    /// POST the route request and return the raw JSON response.
    async fn route(&self, request: &Value) -> Result<Value, AttemptError> {
        let unavailable = |e: reqwest::Error| AttemptError::QuoteUnavailable(e.to_string());
        let resp = self
            .http
            .post(&self.api_url)
            .header("Origin", &self.origin_header)
            .header("Referer", format!("{}/", self.origin_header))
            .json(request)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        let body: Value = resp.json().await.map_err(unavailable)?;
        if let Some(obj) = body.as_object() {
            let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            tracing::debug!(?keys, "route response received");
        }
        Ok(body)
    }
}
