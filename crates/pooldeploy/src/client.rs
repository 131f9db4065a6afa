//! The seam between orchestration logic and the chain.
//!
//! Orchestrators only ever talk to a [`ChainClient`]. The live implementation signs and
//! broadcasts through [`crate::chain::EvmChain`]; tests use a recording fake.

use crate::artifacts::Artifacts;
use crate::chain::{EvmChain, GasLimit};
use alloy::{
    network::{EthereumWallet, TransactionBuilder as _},
    primitives::{Address, Bytes, B256},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use eyre::Context as _;
use std::time::Duration;

/// A mined, successful transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub gas_used: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployed {
    pub address: Address,
    pub tx: TxOutcome,
}

pub trait ChainClient {
    /// Account that signs every write.
    fn sender(&self) -> Address;

    /// Unsigned `eth_call`.
    async fn read(&self, to: Address, data: Bytes) -> eyre::Result<Bytes>;

    /// Sign, submit and wait for the receipt. A reverted transaction is an error.
    ///
    /// `gas_limit` pins the gas ceiling instead of estimating it.
    async fn send(&self, to: Address, data: Bytes, gas_limit: Option<u64>)
        -> eyre::Result<TxOutcome>;

    /// Deploy the compiled contract `contract` with ABI-encoded constructor arguments.
    async fn deploy(&self, contract: &str, constructor_args: Bytes) -> eyre::Result<Deployed>;
}

/// Signs with a local key and submits through the configured RPC endpoints.
#[derive(Debug, Clone)]
pub struct LiveClient {
    pub chain: EvmChain,
    signer: PrivateKeySigner,
    artifacts: Artifacts,
    receipt_timeout: Duration,
}

impl LiveClient {
    pub fn new(
        chain: EvmChain,
        signer: PrivateKeySigner,
        artifacts: Artifacts,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            signer,
            artifacts,
            receipt_timeout,
        }
    }

    async fn submit(
        &self,
        tx: TransactionRequest,
        gas: GasLimit,
    ) -> eyre::Result<(TxOutcome, Option<Address>)> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let tx_hash = self.chain.send_tx(&wallet, tx, gas).await?;
        tracing::debug!(%tx_hash, "waiting for receipt");
        let mined = self.chain.wait_mined(tx_hash, self.receipt_timeout).await?;
        Ok((
            TxOutcome {
                tx_hash,
                gas_used: mined.gas_used,
            },
            mined.contract_address,
        ))
    }
}

impl ChainClient for LiveClient {
    fn sender(&self) -> Address {
        self.signer.address()
    }

    async fn read(&self, to: Address, data: Bytes) -> eyre::Result<Bytes> {
        let tx = TransactionRequest::default()
            .with_from(self.sender())
            .with_to(to)
            .with_input(data);
        self.chain.call(&tx).await
    }

    async fn send(
        &self,
        to: Address,
        data: Bytes,
        gas_limit: Option<u64>,
    ) -> eyre::Result<TxOutcome> {
        let tx = TransactionRequest::default()
            .with_from(self.sender())
            .with_to(to)
            .with_input(data);
        let (outcome, _) = self.submit(tx, GasLimit::from(gas_limit)).await?;
        Ok(outcome)
    }

    async fn deploy(&self, contract: &str, constructor_args: Bytes) -> eyre::Result<Deployed> {
        let bytecode = self.artifacts.bytecode(contract)?;
        let mut code = bytecode.to_vec();
        code.extend_from_slice(&constructor_args);
        let tx = TransactionRequest::default()
            .with_from(self.sender())
            .with_deploy_code(Bytes::from(code));
        let (outcome, address) = self
            .submit(tx, GasLimit::Estimated)
            .await
            .with_context(|| format!("deploy {contract}"))?;
        let address =
            address.ok_or_else(|| eyre::eyre!("deploy {contract}: receipt has no contract address"))?;
        tracing::info!(contract, %address, gas_used = outcome.gas_used, "contract deployed");
        Ok(Deployed {
            address,
            tx: outcome,
        })
    }
}
