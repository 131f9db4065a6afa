//! JSON-RPC access to one EVM network: reads, fee quotes, signing and broadcast.

use crate::config::NetworkConfig;
use crate::retry::{classify, Endpoints, RpcFailure, RpcPolicy};
use alloy::{
    consensus::TxEnvelope,
    eips::eip2718::Encodable2718 as _,
    network::{EthereumWallet, ReceiptResponse as _, TransactionBuilder as _},
    primitives::{Address, Bytes, B256},
    providers::{Provider as _, RootProvider},
    rpc::types::{BlockNumberOrTag, TransactionReceipt, TransactionRequest},
};
use eyre::Context as _;
use std::time::Duration;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const RECEIPT_POLL_FIRST: Duration = Duration::from_millis(500);
const RECEIPT_POLL_MAX: Duration = Duration::from_secs(4);

/// Gas ceiling of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasLimit {
    /// Sent as given; `eth_estimateGas` is never called.
    Pinned(u64),
    /// `eth_estimateGas` plus a fifth.
    Estimated,
}

impl From<Option<u64>> for GasLimit {
    fn from(v: Option<u64>) -> Self {
        v.map_or(Self::Estimated, Self::Pinned)
    }
}

const fn with_headroom(estimate: u64) -> u64 {
    estimate.saturating_add(estimate / 5)
}

/// Fees for one transaction, quoted from the network right before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeQuote {
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    /// Networks whose blocks carry no base fee.
    Legacy { gas_price: u128 },
}

impl FeeQuote {
    /// 1 gwei.
    pub const MIN_TIP: u128 = 1_000_000_000;

    /// Quote from the pending block's base fee (if any) and `eth_gasPrice`.
    ///
    /// The tip is whatever `eth_gasPrice` offers above the base fee, never below
    /// [`Self::MIN_TIP`]. The fee cap covers a doubling of the base fee.
    pub fn from_network(base_fee: Option<u128>, gas_price: u128) -> Self {
        match base_fee {
            None => Self::Legacy { gas_price },
            Some(base) => {
                let tip = gas_price.saturating_sub(base).max(Self::MIN_TIP);
                Self::Eip1559 {
                    max_fee_per_gas: base.saturating_mul(2).saturating_add(tip),
                    max_priority_fee_per_gas: tip,
                }
            }
        }
    }

    fn apply(self, tx: TransactionRequest) -> TransactionRequest {
        match self {
            Self::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => tx
                .with_max_fee_per_gas(max_fee_per_gas)
                .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
            Self::Legacy { gas_price } => tx.with_gas_price(gas_price),
        }
    }
}

/// A request with every field signing needs.
pub fn complete_request(
    tx: TransactionRequest,
    chain_id: u64,
    nonce: u64,
    fees: FeeQuote,
    gas_limit: u64,
) -> TransactionRequest {
    fees.apply(tx)
        .with_chain_id(chain_id)
        .with_nonce(nonce)
        .with_gas_limit(gas_limit)
}

/// Sign a complete request. Returns the envelope and its hash.
pub async fn sign(
    wallet: &EthereumWallet,
    tx: TransactionRequest,
) -> eyre::Result<(TxEnvelope, B256)> {
    let envelope: TxEnvelope = tx.build(wallet).await.context("sign transaction")?;
    let hash = *envelope.tx_hash();
    Ok((envelope, hash))
}

/// The parts of a successful receipt the orchestrators report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mined {
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

pub fn check_receipt(receipt: &TransactionReceipt) -> eyre::Result<Mined> {
    if !receipt.status() {
        eyre::bail!(
            "transaction {} reverted (gas used {})",
            receipt.transaction_hash(),
            receipt.gas_used()
        );
    }
    Ok(Mined {
        gas_used: receipt.gas_used(),
        contract_address: receipt.contract_address(),
    })
}

fn connect(url: &str) -> eyre::Result<RootProvider> {
    let u: reqwest::Url = url
        .parse()
        .with_context(|| format!("invalid rpc url: {url}"))?;
    let http = reqwest::Client::builder()
        .timeout(RPC_TIMEOUT)
        .connect_timeout(RPC_CONNECT_TIMEOUT)
        .build()
        .context("build rpc http client")?;
    let transport = alloy::transports::http::Http::with_client(http, u);
    Ok(RootProvider::new(alloy::rpc::client::RpcClient::new(
        transport, false,
    )))
}

#[derive(Debug, Clone)]
pub struct EvmChain {
    /// Network name from the config, used in logs.
    pub name: String,
    pub chain_id: u64,
    endpoints: Endpoints,
}

impl EvmChain {
    pub fn from_config(name: &str, net: &NetworkConfig) -> Self {
        Self {
            name: name.to_owned(),
            chain_id: net.chain_id,
            endpoints: Endpoints::new(&net.rpc_url, &net.fallback_rpc_urls),
        }
    }

    async fn read<T, Fut>(&self, what: &str, f: impl Fn(RootProvider) -> Fut) -> eyre::Result<T>
    where
        Fut: std::future::Future<Output = eyre::Result<T>>,
    {
        self.endpoints
            .failover(RpcPolicy::Read, what, |url| {
                let provider = connect(url);
                let f = &f;
                async move { f(provider?).await }
            })
            .await
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, tx: &TransactionRequest) -> eyre::Result<Bytes> {
        self.read("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(tx).await.context("eth_call") }
        })
        .await
    }

    pub async fn quote_fees(&self) -> eyre::Result<FeeQuote> {
        self.read("fee quote", |p| async move {
            let base_fee = p
                .get_block_by_number(BlockNumberOrTag::Pending)
                .await
                .context("pending block")?
                .and_then(|b| b.header.base_fee_per_gas)
                .map(u128::from);
            let gas_price = p.get_gas_price().await.context("eth_gasPrice")?;
            Ok(FeeQuote::from_network(base_fee, gas_price))
        })
        .await
    }

    async fn pending_nonce(&self, from: Address) -> eyre::Result<u64> {
        self.read("pending nonce", |p| async move {
            p.get_transaction_count(from)
                .pending()
                .await
                .context("eth_getTransactionCount")
        })
        .await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> eyre::Result<u64> {
        self.read("eth_estimateGas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(tx).await.context("eth_estimateGas") }
        })
        .await
    }

    async fn broadcast(&self, raw: &[u8]) -> eyre::Result<()> {
        self.endpoints
            .failover(RpcPolicy::Broadcast, "eth_sendRawTransaction", |url| {
                let provider = connect(url);
                async move {
                    match provider?.send_raw_transaction(raw).await {
                        Ok(_) => Ok(()),
                        Err(e) => {
                            let e = eyre::Report::new(e);
                            if classify(&e) == RpcFailure::AlreadyAccepted {
                                Ok(())
                            } else {
                                Err(e)
                            }
                        }
                    }
                }
            })
            .await
    }

    /// Fill nonce, fees and gas, sign once with `wallet`, then broadcast the signed bytes
    /// until an endpoint takes them.
    pub async fn send_tx(
        &self,
        wallet: &EthereumWallet,
        tx: TransactionRequest,
        gas: GasLimit,
    ) -> eyre::Result<B256> {
        let from = tx
            .from
            .ok_or_else(|| eyre::eyre!("transaction has no sender"))?;
        let nonce = self.pending_nonce(from).await?;
        let fees = self.quote_fees().await?;
        let gas_limit = match gas {
            GasLimit::Pinned(g) => g,
            GasLimit::Estimated => with_headroom(self.estimate_gas(&tx).await?),
        };

        let tx = complete_request(tx, self.chain_id, nonce, fees, gas_limit);
        let (envelope, tx_hash) = sign(wallet, tx).await?;
        self.broadcast(&envelope.encoded_2718()).await?;
        tracing::debug!(network = %self.name, %tx_hash, nonce, gas_limit, "broadcast");
        Ok(tx_hash)
    }

    /// Poll for the receipt of `tx_hash`, backing off from half a second up to four.
    pub async fn wait_mined(&self, tx_hash: B256, timeout: Duration) -> eyre::Result<Mined> {
        let poll = async {
            let mut interval = RECEIPT_POLL_FIRST;
            loop {
                let receipt = self
                    .read("eth_getTransactionReceipt", |p| async move {
                        p.get_transaction_receipt(tx_hash)
                            .await
                            .context("eth_getTransactionReceipt")
                    })
                    .await?;
                if let Some(r) = receipt {
                    return check_receipt(&r);
                }
                tokio::time::sleep(interval).await;
                interval = interval.saturating_mul(2).min(RECEIPT_POLL_MAX);
            }
        };
        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            eyre::eyre!(
                "no receipt for {tx_hash} on {} after {}s",
                self.name,
                timeout.as_secs()
            )
        })?
    }
}
