//! One hand-prepared `batchInitReserve`, submitted as a single transaction.

use crate::chunk::zip_exact;
use crate::client::ChainClient;
use crate::contracts::Configurator;
use crate::reserves::InitReserveRecord;
use alloy::primitives::{Address, B256};
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `{ "symbols": [...], "reserves": [...] }`, one symbol per reserve, same order.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchFile {
    pub symbols: Vec<String>,
    pub reserves: Vec<InitReserveRecord>,
}

impl BatchFile {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
    }

    /// Pair symbols with records, rejecting files where the two lists drift apart.
    pub fn into_records(self) -> eyre::Result<Vec<(String, InitReserveRecord)>> {
        let pairs = zip_exact(self.symbols, self.reserves).context("batch file")?;
        for (symbol, record) in &pairs {
            if record.underlying_asset_name != *symbol {
                tracing::warn!(
                    %symbol,
                    underlying_asset_name = %record.underlying_asset_name,
                    "symbol does not match the record's underlying asset name"
                );
            }
        }
        Ok(pairs)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReport {
    pub configurator: Address,
    pub symbols: Vec<String>,
    pub tx_hash: B256,
    pub gas_used: u64,
}

pub async fn run<C: ChainClient>(
    client: &C,
    configurator: Address,
    batch: BatchFile,
) -> eyre::Result<SubmitReport> {
    let pairs = batch.into_records()?;
    if pairs.is_empty() {
        eyre::bail!("batch file has no reserves");
    }
    let symbols: Vec<String> = pairs.iter().map(|(s, _)| s.clone()).collect();
    tracing::info!(%configurator, symbols = %symbols.join(", "), "submitting batchInitReserve");

    let tx = Configurator::new(client, configurator)
        .batch_init_reserve(pairs.iter().map(|(_, r)| r))
        .await?;
    tracing::info!(tx_hash = %tx.tx_hash, gas_used = tx.gas_used, "done");

    Ok(SubmitReport {
        configurator,
        symbols,
        tx_hash: tx.tx_hash,
        gas_used: tx.gas_used,
    })
}
