use directories::ProjectDirs;
use eyre::{Context as _, ContextCompat as _};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct KyoswapPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_file: PathBuf,
}

impl KyoswapPaths {
    fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            log_file: data_dir.join("kyoswap.log.jsonl"),
            config_dir,
            data_dir,
        }
    }

    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("KYOSWAP_DATA_DIR"),
            std::env::var("KYOSWAP_CONFIG_DIR"),
        ) {
            return Ok(Self::from_dirs(
                PathBuf::from(config_dir),
                PathBuf::from(data_dir),
            ));
        }

        // macOS: ~/Library/Application Support/kyoswap
        // Linux: ~/.config/kyoswap, ~/.local/share/kyoswap
        // Windows: %APPDATA%\\kyoswap
        let proj = ProjectDirs::from("", "", "kyoswap").context("failed to resolve project dirs")?;
        Ok(Self::from_dirs(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    pub fn ensure_data_dir(&self) -> eyre::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("create {}", self.data_dir.display()))
    }
}
