//! Reserve initialization: token implementations, one rate strategy per strategy name, then
//! `batchInitReserve` in chunks.

use super::{submit_in_chunks, total_gas, ChunkReport, TaskContext};
use crate::admin::ensure_pool_admin;
use crate::client::ChainClient;
use crate::config::on_network;
use crate::contracts::{names, strategy_constructor_args, AddressesProvider, Configurator};
use crate::reserves::{
    addressed_reserves, build_init_records, ATokenImpl, AddressedReserve, ImplementationSet,
    InitRecordContext, Skipped,
};
use alloy::primitives::{Address, Bytes};
use eyre::Context as _;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub network: String,
    pub configurator: Address,
    pub strategies: BTreeMap<String, Address>,
    pub chunks: Vec<ChunkReport>,
    pub skipped: Vec<Skipped>,
    pub total_gas_used: u64,
}

async fn resolve_implementations<C: ChainClient>(
    ctx: &mut TaskContext<'_, C>,
    targets: &[AddressedReserve<'_>],
) -> eyre::Result<ImplementationSet> {
    let needs_delegation_aware = targets
        .iter()
        .any(|(_, p, _)| p.a_token_impl == ATokenImpl::DelegationAwareAToken);

    let a_token = ctx
        .resolve_or_deploy(names::ATOKEN_IMPL_KEY, names::ATOKEN, Bytes::new())
        .await?;
    let delegation_aware_a_token = if needs_delegation_aware {
        Some(
            ctx.resolve_or_deploy(
                names::DELEGATION_AWARE_ATOKEN_IMPL_KEY,
                names::DELEGATION_AWARE_ATOKEN,
                Bytes::new(),
            )
            .await?,
        )
    } else {
        None
    };
    let stable_debt_token = ctx
        .resolve_or_deploy(
            names::STABLE_DEBT_TOKEN_IMPL_KEY,
            names::STABLE_DEBT_TOKEN,
            Bytes::new(),
        )
        .await?;
    let variable_debt_token = ctx
        .resolve_or_deploy(
            names::VARIABLE_DEBT_TOKEN_IMPL_KEY,
            names::VARIABLE_DEBT_TOKEN,
            Bytes::new(),
        )
        .await?;

    Ok(ImplementationSet {
        a_token,
        delegation_aware_a_token,
        stable_debt_token,
        variable_debt_token,
    })
}

/// Deploy one `DefaultReserveInterestRateStrategy` per distinct strategy name. A recorded
/// strategy is reused only while its constructor arguments are unchanged.
async fn resolve_strategies<C: ChainClient>(
    ctx: &mut TaskContext<'_, C>,
    targets: &[AddressedReserve<'_>],
    provider: Address,
) -> eyre::Result<BTreeMap<String, Address>> {
    let mut wanted = BTreeMap::new();
    for &(symbol, params, _) in targets {
        let s = &params.strategy;
        match wanted.entry(s.name.clone()) {
            Entry::Vacant(v) => {
                v.insert(s.clone());
            }
            Entry::Occupied(first) if first.get() != s => {
                tracing::warn!(
                    %symbol,
                    strategy = %s.name,
                    "strategy name reused with different coefficients; the first definition wins"
                );
            }
            Entry::Occupied(_) => {}
        }
    }

    let mut deployed = BTreeMap::new();
    for (name, params) in wanted {
        let args = strategy_constructor_args(provider, &params)
            .with_context(|| format!("strategy {name}"))?;
        let addr = ctx
            .resolve_or_deploy(&name, names::RATE_STRATEGY, args)
            .await?;
        deployed.insert(name, addr);
    }
    Ok(deployed)
}

pub async fn run<C: ChainClient>(ctx: &mut TaskContext<'_, C>) -> eyre::Result<InitReport> {
    let provider_addr = ctx.require(names::ADDRESSES_PROVIDER)?;
    let configurator_addr = ctx.require(names::CONFIGURATOR)?;
    let signer = ctx.client.sender();
    let configured = ctx.pool_admin();
    if configured != signer {
        tracing::warn!(%configured, %signer, "configured pool admin is not the signer");
    }
    // batchInitReserve is onlyPoolAdmin; the signer itself must hold the role.
    ensure_pool_admin(&AddressesProvider::new(ctx.client, provider_addr), signer).await?;

    let market = ctx.market;
    let tokens = market.tokens_on(ctx.network);
    let mut skipped = Vec::new();
    let targets = addressed_reserves(&market.reserves, &tokens, &mut skipped);

    let implementations = resolve_implementations(ctx, &targets).await?;
    let strategies = resolve_strategies(ctx, &targets, provider_addr).await?;

    let record_ctx = InitRecordContext {
        prefixes: &market.prefixes,
        implementations: &implementations,
        strategies: &strategies,
        treasury: on_network(&market.treasury, ctx.network).unwrap_or(Address::ZERO),
        incentives_controller: on_network(&market.incentives_controller, ctx.network)
            .unwrap_or(Address::ZERO),
    };
    let records = build_init_records(&targets, &record_ctx)?;

    let size = market.init_chunk_size;
    tracing::info!(
        txs = crate::chunk::chunk_count(records.len(), size),
        "Reserves initialization in {} txs",
        crate::chunk::chunk_count(records.len(), size)
    );

    let configurator = Configurator::new(ctx.client, configurator_addr);
    let chunks = submit_in_chunks(&records, size, "Reserve init for:", |batch| {
        let configurator = &configurator;
        async move { configurator.batch_init_reserve(&batch).await }
    })
    .await?;

    let total_gas_used = total_gas(&chunks);
    tracing::info!(total_gas_used, "reserves initialized");
    Ok(InitReport {
        network: ctx.network.to_owned(),
        configurator: configurator_addr,
        strategies,
        chunks,
        skipped,
        total_gas_used,
    })
}
