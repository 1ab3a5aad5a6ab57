use crate::{config::SwapConfig, paths::KyoswapPaths};
use eyre::Context as _;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr as _;

pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

pub(crate) fn is_truthy_env(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "y" | "yes" | "on"
    )
}

/// Apply environment variable overrides on top of the file.
fn apply_env_overrides(
    cfg: &mut SwapConfig,
    var: impl Fn(&str) -> Option<String>,
) -> eyre::Result<()> {
    let get = |name: &str| {
        var(name)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get("RPC_URL") {
        cfg.rpc.rpc_url = v;
    }
    if let Some(v) = get("KYOKO_API_URL") {
        cfg.quote.api_url = v;
    }
    if let Some(v) = get("DRY_RUN") {
        cfg.driver.dry_run = is_truthy_env(&v);
    }
    if let Some(v) = get("GAS_BUFFER_MULTIPLIER") {
        cfg.engine.gas_buffer_multiplier = Decimal::from_str(&v)
            .with_context(|| format!("invalid GAS_BUFFER_MULTIPLIER: {v}"))?;
    }
    if let Some(v) = get("KYOSWAP_USDC_ADDRESS") {
        cfg.tokens.usdc_address = v;
    }
    Ok(())
}

impl ConfigStore {
    pub fn new(paths: &KyoswapPaths) -> Self {
        Self {
            path: paths.config_file.clone(),
        }
    }

    /// Read `config.toml` (defaults when absent) and apply env overrides. Never writes.
    pub fn load(&self) -> eyre::Result<SwapConfig> {
        self.load_with(|name| std::env::var(name).ok())
    }

    fn load_with(&self, var: impl Fn(&str) -> Option<String>) -> eyre::Result<SwapConfig> {
        let mut cfg = if self.path.exists() {
            let s = std::fs::read_to_string(&self.path).context("read config.toml")?;
            toml::from_str(&s).context("parse config.toml")?
        } else {
            tracing::debug!(path = %self.path.display(), "no config file; using defaults");
            SwapConfig::default()
        };
        apply_env_overrides(&mut cfg, var)?;
        Ok(cfg)
    }
}

/// The signing key. Only ever read from the environment.
pub fn private_key_from_env() -> eyre::Result<SecretString> {
    let v = std::env::var(PRIVATE_KEY_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| eyre::eyre!("{PRIVATE_KEY_ENV} is not set"))?;
    Ok(SecretString::from(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore {
            path: dir.path().join("config.toml"),
        }
    }

    #[test]
    fn missing_file_means_defaults() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = store_in(&dir).load_with(|_| None)?;
        assert_eq!(cfg, SwapConfig::default());
        assert!(!dir.path().join("config.toml").exists(), "load must not write");
        Ok(())
    }

    #[test]
    fn env_overrides_file_values() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("config.toml"),
            "[rpc]\nrpc_url = \"https://file.example\"\n[driver]\ndry_run = false\n",
        )?;
        let env: HashMap<&str, &str> = HashMap::from([
            ("RPC_URL", " https://env.example "),
            ("DRY_RUN", "YES"),
            ("GAS_BUFFER_MULTIPLIER", "1.35"),
            ("KYOKO_API_URL", ""),
        ]);
        let cfg = store_in(&dir).load_with(|k| env.get(k).map(|v| (*v).to_owned()))?;
        assert_eq!(cfg.rpc.rpc_url, "https://env.example");
        assert!(cfg.driver.dry_run);
        assert_eq!(cfg.engine.gas_buffer_multiplier, Decimal::from_str("1.35")?);
        // Empty values are ignored.
        assert_eq!(cfg.quote.api_url, crate::config::KYOKO_ROUTE_URL);
        Ok(())
    }

    #[test]
    fn bad_multiplier_env_is_an_error() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let r = store_in(&dir).load_with(|k| (k == "GAS_BUFFER_MULTIPLIER").then(|| "lots".to_owned()));
        assert!(r.is_err(), "expected parse error");
        Ok(())
    }

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "Y", "yes", "on"] {
            assert!(is_truthy_env(v), "{v}");
        }
        for v in ["0", "false", "n", ""] {
            assert!(!is_truthy_env(v), "{v}");
        }
    }
}
