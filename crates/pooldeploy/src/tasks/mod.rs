//! Orchestration runs. Each task resolves what it needs from the address book and market
//! config, then drives the chain through a [`ChainClient`].

pub mod address_provider;
pub mod configure_reserves;
pub mod init_reserves;
pub mod lending_pool;
pub mod plan;
pub mod submit_batch;

use crate::address_book::AddressBook;
use crate::chunk::{chunk_count, chunks, ChunkSize};
use crate::client::{ChainClient, TxOutcome};
use crate::config::{on_network, MarketConfig};
use crate::errors::DeployError;
use alloy::primitives::{Address, Bytes, B256};
use serde::Serialize;
use std::future::Future;

/// Everything a task run needs besides its own arguments.
pub struct TaskContext<'a, C> {
    pub client: &'a C,
    pub network: &'a str,
    pub market: &'a MarketConfig,
    pub book: &'a mut AddressBook,
    /// Accepted for parity with explorer-verifying deploy flows; only logged.
    pub verify: bool,
}

impl<C: ChainClient> TaskContext<'_, C> {
    /// The market's pool admin on this network, or the signer when none is configured.
    pub fn pool_admin(&self) -> Address {
        on_network(&self.market.pool_admin, self.network).unwrap_or_else(|| self.client.sender())
    }

    pub fn emergency_admin(&self) -> Address {
        on_network(&self.market.emergency_admin, self.network).unwrap_or_else(|| self.pool_admin())
    }

    pub fn require(&self, contract: &str) -> eyre::Result<Address> {
        Ok(self.book.require(contract, self.network)?)
    }

    pub fn record(&mut self, contract: &str, address: Address) -> eyre::Result<()> {
        self.book
            .insert(contract, self.network, address, Some(self.client.sender()))
    }

    /// Deploy `contract` and record its address and constructor-args hash under `key`.
    pub async fn deploy_and_record(
        &mut self,
        key: &str,
        contract: &str,
        constructor_args: Bytes,
    ) -> eyre::Result<Address> {
        let d = crate::contracts::deploy_contract(
            self.client,
            contract,
            constructor_args.clone(),
            self.verify,
        )
        .await?;
        self.book.insert_deployed(
            key,
            self.network,
            d.address,
            self.client.sender(),
            &constructor_args,
        )?;
        Ok(d.address)
    }

    /// The address recorded under `key` when it was deployed with `constructor_args`;
    /// otherwise deploy `contract` and record the new address.
    pub async fn resolve_or_deploy(
        &mut self,
        key: &str,
        contract: &str,
        constructor_args: Bytes,
    ) -> eyre::Result<Address> {
        if let Some(e) = self.book.entry(key, self.network) {
            if e.built_from(&constructor_args) {
                tracing::info!(key, address = %e.address, "reusing recorded contract");
                return Ok(e.address);
            }
            tracing::warn!(
                key,
                recorded = %e.address,
                "constructor arguments differ from the recorded deployment; redeploying"
            );
        }
        self.deploy_and_record(key, contract, constructor_args).await
    }
}

/// One mined batch transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    /// 1-based.
    pub index: usize,
    pub symbols: Vec<String>,
    pub tx_hash: B256,
    pub gas_used: u64,
}

/// Submit `records` in chunks of `size`, one transaction per chunk, strictly in order.
/// `label` prefixes the per-chunk log line naming the symbols about to be sent.
///
/// The first failing chunk stops the loop; its symbols and those of every later chunk are
/// reported as unapplied in [`DeployError::ChunkFailed`].
pub async fn submit_in_chunks<R, F, Fut>(
    records: &[(String, R)],
    size: ChunkSize,
    label: &str,
    mut submit: F,
) -> eyre::Result<Vec<ChunkReport>>
where
    R: Clone,
    F: FnMut(Vec<R>) -> Fut,
    Fut: Future<Output = eyre::Result<TxOutcome>>,
{
    let total = chunk_count(records.len(), size);
    let mut reports = Vec::with_capacity(total);
    for (i, chunk) in chunks(records, size).enumerate() {
        let index = i + 1;
        let symbols: Vec<String> = chunk.iter().map(|(s, _)| s.clone()).collect();
        let batch: Vec<R> = chunk.iter().map(|(_, r)| r.clone()).collect();
        tracing::info!(chunk = index, total, "{label} {}", symbols.join(", "));
        match submit(batch).await {
            Ok(tx) => {
                tracing::info!(
                    chunk = index,
                    total,
                    tx_hash = %tx.tx_hash,
                    gas_used = tx.gas_used,
                    "  - ready: {}",
                    symbols.join(", ")
                );
                reports.push(ChunkReport {
                    index,
                    symbols,
                    tx_hash: tx.tx_hash,
                    gas_used: tx.gas_used,
                });
            }
            Err(e) => {
                let unapplied: Vec<String> = records
                    .iter()
                    .skip(i * size.get())
                    .map(|(s, _)| s.clone())
                    .collect();
                tracing::error!(
                    chunk = index,
                    total,
                    unapplied = %unapplied.join(", "),
                    error = %format!("{e:#}"),
                    "batch failed; remaining chunks not submitted"
                );
                return Err(e.wrap_err(DeployError::ChunkFailed {
                    index,
                    total,
                    unapplied,
                }));
            }
        }
    }
    Ok(reports)
}

pub fn total_gas(reports: &[ChunkReport]) -> u64 {
    reports.iter().map(|r| r.gas_used).sum()
}
