//! Endpoint failover for node requests.
//!
//! A request walks the endpoint list in order; a full pass with no success is followed by a
//! pause before the next pass. How many passes, and how long the pauses are, depends on what
//! kind of request it is. A classifier stops the walk early on failures no endpoint can fix.

use std::future::Future;
use std::time::Duration;

/// Whether trying another endpoint could change the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Timeouts, connection errors, lagging or overloaded nodes.
    Transient,
    /// Deterministic rejections (reverts, nonce too low, insufficient funds).
    Fatal,
}

/// Every failure is worth another endpoint.
pub const fn always_transient(_: &eyre::Report) -> Failure {
    Failure::Transient
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Full passes over the endpoint list.
    pub passes: usize,
    /// Pause after the first failed pass; doubles after each further pass.
    pub first_pause: Duration,
    pub max_pause: Duration,
    /// Upper bound of the random extra added to each pause.
    pub jitter: Duration,
}

impl FailoverPolicy {
    /// Idempotent reads (balances, nonce, fees): several passes with growing pauses.
    pub const fn reads(passes: usize) -> Self {
        Self {
            passes,
            first_pause: Duration::from_millis(400),
            max_pause: Duration::from_secs(4),
            jitter: Duration::from_millis(250),
        }
    }

    /// Raw transaction broadcast: every endpoint twice with a short pause. The receipt wait
    /// that follows is the real confirmation, so there is no point retrying harder here.
    pub const fn broadcast() -> Self {
        Self {
            passes: 2,
            first_pause: Duration::from_millis(250),
            max_pause: Duration::from_millis(250),
            jitter: Duration::ZERO,
        }
    }

    /// One pass, no pauses. For callers that already loop on their own schedule, such as
    /// receipt polling.
    pub const fn single_pass() -> Self {
        Self {
            passes: 1,
            first_pause: Duration::ZERO,
            max_pause: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Pause after failed pass number `pass` (zero-based).
    fn pause_after(&self, pass: usize) -> Duration {
        let factor = u32::try_from(pass).map_or(u32::MAX, |p| 2_u32.saturating_pow(p));
        let pause = self.first_pause.saturating_mul(factor).min(self.max_pause);
        if self.jitter.is_zero() {
            return pause;
        }
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        pause.saturating_add(Duration::from_millis(rand::random_range(0..=jitter_ms)))
    }
}

/// Run `op` against each endpoint until one succeeds, following `policy`.
///
/// A failure that `classify` calls [`Failure::Fatal`] is returned at once. Otherwise the last
/// error is returned, wrapped with `label`, once the passes run out.
pub async fn across_endpoints<T, Fut>(
    endpoints: &[String],
    policy: FailoverPolicy,
    label: &'static str,
    classify: fn(&eyre::Report) -> Failure,
    mut op: impl FnMut(&str) -> Fut + Send,
) -> eyre::Result<T>
where
    Fut: Future<Output = eyre::Result<T>> + Send,
{
    if endpoints.is_empty() {
        eyre::bail!("{label}: no rpc endpoints configured");
    }

    let mut last_err = None;
    for pass in 0..policy.passes.max(1) {
        if pass > 0 {
            tokio::time::sleep(policy.pause_after(pass - 1)).await;
        }
        for endpoint in endpoints {
            let e = match op(endpoint).await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if classify(&e) == Failure::Fatal {
                return Err(e.wrap_err(label));
            }
            tracing::debug!(%endpoint, pass, error = %format!("{e:#}"), "{label}: endpoint failed");
            last_err = Some(e);
        }
    }
    Err(last_err
        .unwrap_or_else(|| eyre::eyre!("no endpoint answered"))
        .wrap_err(label))
}
