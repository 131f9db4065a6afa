//! Persisted record of deployed contract addresses.
//!
//! Entries are keyed `"<contractName>.<networkName>"`, so one file can hold several networks.
//! Later steps read what earlier steps wrote (the configurator proxy recorded by
//! `deploy-lending-pool` is what `init-reserves` submits to).

use crate::errors::DeployError;
use alloy::primitives::{keccak256, Address, B256};
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    /// keccak256 of the ABI-encoded constructor arguments the contract was deployed with.
    /// Absent for addresses recorded without a deployment (proxies, imported entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_args_hash: Option<B256>,
    /// RFC 3339 UTC timestamp of the write.
    pub recorded_at: String,
}

impl AddressEntry {
    /// Whether this deployment was built from `constructor_args`.
    ///
    /// Entries without a hash only match argument-less constructors.
    pub fn built_from(&self, constructor_args: &[u8]) -> bool {
        match self.constructor_args_hash {
            Some(h) => h == keccak256(constructor_args),
            None => constructor_args.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddressBook {
    path: PathBuf,
    entries: BTreeMap<String, AddressEntry>,
}

pub fn entry_key(contract: &str, network: &str) -> String {
    format!("{contract}.{network}")
}

impl AddressBook {
    /// Load the book at `path`; a missing file is an empty book.
    pub fn open(path: &Path) -> eyre::Result<Self> {
        let entries = if path.exists() {
            let s = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            if s.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, contract: &str, network: &str) -> Option<Address> {
        self.entry(contract, network).map(|e| e.address)
    }

    pub fn entry(&self, contract: &str, network: &str) -> Option<&AddressEntry> {
        self.entries
            .get(&entry_key(contract, network))
            .filter(|e| !e.address.is_zero())
    }

    pub fn require(&self, contract: &str, network: &str) -> Result<Address, DeployError> {
        self.get(contract, network)
            .ok_or_else(|| DeployError::MissingAddress {
                key: entry_key(contract, network),
            })
    }

    /// Record `address` and persist the whole book immediately.
    pub fn insert(
        &mut self,
        contract: &str,
        network: &str,
        address: Address,
        deployer: Option<Address>,
    ) -> eyre::Result<()> {
        self.put(contract, network, address, deployer, None)
    }

    /// Record a fresh deployment together with the hash of its constructor arguments.
    pub fn insert_deployed(
        &mut self,
        contract: &str,
        network: &str,
        address: Address,
        deployer: Address,
        constructor_args: &[u8],
    ) -> eyre::Result<()> {
        self.put(
            contract,
            network,
            address,
            Some(deployer),
            Some(keccak256(constructor_args)),
        )
    }

    fn put(
        &mut self,
        contract: &str,
        network: &str,
        address: Address,
        deployer: Option<Address>,
        constructor_args_hash: Option<B256>,
    ) -> eyre::Result<()> {
        let key = entry_key(contract, network);
        if let Some(prev) = self.entries.get(&key) {
            if prev.address != address {
                tracing::warn!(%key, previous = %prev.address, %address, "overwriting address book entry");
            }
        }
        self.entries.insert(
            key.clone(),
            AddressEntry {
                address,
                deployer,
                constructor_args_hash,
                recorded_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.save()?;
        tracing::info!(%key, %address, "recorded contract address");
        Ok(())
    }

    pub fn entries(&self) -> &BTreeMap<String, AddressEntry> {
        &self.entries
    }

    fn save(&self) -> eyre::Result<()> {
        let s = serde_json::to_string_pretty(&self.entries).context("serialize address book")?;
        crate::fsutil::write_atomic(&self.path, s.as_bytes())
            .with_context(|| format!("write address book {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_survive_reopen_and_are_network_scoped() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("deployed-contracts.json");

        let mut book = AddressBook::open(&p)?;
        assert!(book.entries().is_empty(), "missing file is an empty book");

        let configurator = Address::with_last_byte(0x42);
        book.insert("LendingPoolConfigurator", "sepolia", configurator, None)?;

        let reopened = AddressBook::open(&p)?;
        assert_eq!(
            reopened.get("LendingPoolConfigurator", "sepolia"),
            Some(configurator)
        );
        assert_eq!(reopened.get("LendingPoolConfigurator", "polygon"), None);
        assert!(
            reopened.entries().contains_key("LendingPoolConfigurator.sepolia"),
            "keys are <contract>.<network>"
        );
        Ok(())
    }

    #[test]
    fn require_reports_the_missing_key() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let book = AddressBook::open(&dir.path().join("book.json"))?;
        assert_eq!(
            book.require("ATokensAndRatesHelper", "localhost"),
            Err(DeployError::MissingAddress {
                key: "ATokensAndRatesHelper.localhost".to_owned()
            })
        );
        Ok(())
    }

    #[test]
    fn zero_address_counts_as_absent() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = AddressBook::open(&dir.path().join("book.json"))?;
        book.insert("LendingPool", "localhost", Address::ZERO, None)?;
        assert_eq!(book.get("LendingPool", "localhost"), None);
        Ok(())
    }

    #[test]
    fn deployed_entries_remember_their_constructor_args() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("book.json");
        let deployer = Address::with_last_byte(0xad);

        let mut book = AddressBook::open(&p)?;
        book.insert_deployed(
            "rateStrategyStable",
            "localhost",
            Address::with_last_byte(0x81),
            deployer,
            &[1, 2, 3],
        )?;
        book.insert("LendingPool", "localhost", Address::with_last_byte(0x71), None)?;

        let reopened = AddressBook::open(&p)?;
        let strategy = reopened
            .entry("rateStrategyStable", "localhost")
            .ok_or_else(|| eyre::eyre!("strategy entry missing"))?;
        assert!(strategy.built_from(&[1, 2, 3]));
        assert!(!strategy.built_from(&[1, 2, 4]), "different args");
        assert_eq!(strategy.deployer, Some(deployer));

        let proxy = reopened
            .entry("LendingPool", "localhost")
            .ok_or_else(|| eyre::eyre!("proxy entry missing"))?;
        assert!(proxy.built_from(&[]), "no hash matches an empty constructor");
        assert!(!proxy.built_from(&[1]), "no hash never matches real arguments");
        Ok(())
    }
}
