use crate::{config::DeployConfig, paths::DeployPaths};
use eyre::Context as _;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Apply environment variable overrides on top of the file contents.
fn apply_env_overrides(cfg: &mut DeployConfig) {
    /// Helper: if an env var is set and non-empty, apply `setter` with the trimmed value.
    fn apply_env(var: &str, setter: impl FnOnce(&str)) {
        if let Ok(u) = std::env::var(var) {
            let t = u.trim();
            if !t.is_empty() {
                setter(t);
            }
        }
    }

    apply_env("POOLDEPLOY_NETWORK", |v| {
        v.clone_into(&mut cfg.network);
    });
    apply_env("POOLDEPLOY_ARTIFACTS_DIR", |v| {
        cfg.artifacts_dir = PathBuf::from(v);
    });
    // Applies to whichever network ends up selected, so it must run after POOLDEPLOY_NETWORK.
    apply_env("POOLDEPLOY_RPC_URL", |v| {
        if let Some(net) = cfg.networks.get_mut(&cfg.network) {
            v.clone_into(&mut net.rpc_url);
        }
    });
    if let Ok(v) = std::env::var("POOLDEPLOY_RECEIPT_TIMEOUT_SECONDS") {
        if let Ok(n) = v.trim().parse::<u64>() {
            if n > 0 {
                cfg.receipt_timeout_seconds = n;
            }
        }
    }
}

impl ConfigStore {
    pub fn new(paths: &DeployPaths) -> Self {
        Self {
            path: paths.config_file(),
        }
    }

    /// Use an explicit config file (`--config`).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config, writing the defaults on first run.
    pub fn load_or_init_default(&self) -> eyre::Result<DeployConfig> {
        if !self.path.exists() {
            let cfg = DeployConfig::default();
            self.save(&cfg)?;
            let mut cfg = cfg;
            apply_env_overrides(&mut cfg);
            return Ok(cfg);
        }

        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let mut cfg: DeployConfig =
            toml::from_str(&s).with_context(|| format!("parse {}", self.path.display()))?;
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &DeployConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config")?;
        crate::fsutil::write_atomic(&self.path, s.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_writes_defaults_that_load_back() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ConfigStore::at(dir.path().join("cfg").join("pooldeploy.toml"));
        let first = store.load_or_init_default()?;
        assert!(store.path().exists(), "defaults are persisted");

        let s = fs::read_to_string(store.path())?;
        let on_disk: DeployConfig = toml::from_str(&s)?;
        assert_eq!(on_disk.networks, first.networks);
        assert_eq!(on_disk.receipt_timeout_seconds, 600);
        Ok(())
    }

    #[test]
    fn broken_toml_names_the_file() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("pooldeploy.toml");
        fs::write(&p, "markets = 3\n")?;
        let err = ConfigStore::at(&p)
            .load_or_init_default()
            .err()
            .ok_or_else(|| eyre::eyre!("expected parse error"))?;
        assert!(format!("{err}").contains("pooldeploy.toml"));
        Ok(())
    }
}
