use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use eyre::Context as _;
use secrecy::{ExposeSecret as _, SecretString};
use std::str::FromStr as _;

pub const PRIVATE_KEY_ENV: &str = "POOLDEPLOY_PRIVATE_KEY";
pub const MNEMONIC_ENV: &str = "POOLDEPLOY_MNEMONIC";
pub const MNEMONIC_INDEX_ENV: &str = "POOLDEPLOY_MNEMONIC_INDEX";

/// Where the deployer key comes from.
#[derive(Debug)]
pub enum SignerSource {
    PrivateKey(SecretString),
    Mnemonic { phrase: SecretString, index: u32 },
}

impl SignerSource {
    /// Read the key material from the environment. A private key wins over a mnemonic.
    pub fn from_env() -> eyre::Result<Self> {
        fn non_empty(var: &str) -> Option<SecretString> {
            std::env::var(var)
                .ok()
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .map(|v| SecretString::new(v.into()))
        }

        if let Some(key) = non_empty(PRIVATE_KEY_ENV) {
            return Ok(Self::PrivateKey(key));
        }
        if let Some(phrase) = non_empty(MNEMONIC_ENV) {
            let index = match std::env::var(MNEMONIC_INDEX_ENV) {
                Ok(s) if !s.trim().is_empty() => s
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("{MNEMONIC_INDEX_ENV} must be a u32"))?,
                _ => 0,
            };
            return Ok(Self::Mnemonic { phrase, index });
        }
        eyre::bail!("no deployer key: set {PRIVATE_KEY_ENV} or {MNEMONIC_ENV}")
    }

    pub fn signer(&self) -> eyre::Result<PrivateKeySigner> {
        match self {
            Self::PrivateKey(key) => {
                PrivateKeySigner::from_str(key.expose_secret()).context("parse evm private key")
            }
            Self::Mnemonic { phrase, index } => MnemonicBuilder::<English>::default()
                .phrase(phrase.expose_secret())
                .index(*index)
                .context("evm index")?
                .build()
                .context("build evm wallet"),
        }
    }
}
