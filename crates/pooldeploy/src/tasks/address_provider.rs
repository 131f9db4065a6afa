//! `LendingPoolAddressesProvider` for a market, its registry entry and the genesis admins.

use super::TaskContext;
use crate::client::ChainClient;
use crate::config::on_network;
use crate::contracts::{names, AddressesProvider, ProviderRegistry};
use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolValue as _;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AddressProviderReport {
    pub provider: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<u64>,
    pub pool_admin: Address,
    pub emergency_admin: Address,
}

/// Add `provider` to the market's registry, deploying a registry when none is configured.
async fn register<C: ChainClient>(
    ctx: &mut TaskContext<'_, C>,
    provider: Address,
) -> eyre::Result<(Address, u64)> {
    let registry_addr = match on_network(&ctx.market.provider_registry, ctx.network) {
        Some(a) => a,
        None => {
            ctx.resolve_or_deploy(names::PROVIDER_REGISTRY, names::PROVIDER_REGISTRY, Bytes::new())
                .await?
        }
    };
    let registry = ProviderRegistry::new(ctx.client, registry_addr);

    let id = match ctx.market.provider_id {
        Some(id) => id,
        None => {
            let existing = registry.providers().await?;
            u64::try_from(existing.len())?.saturating_add(1)
        }
    };
    let tx = registry.register(provider, id).await?;
    tracing::info!(registry = %registry_addr, %provider, id, tx_hash = %tx.tx_hash, "provider registered");
    Ok((registry_addr, id))
}

pub async fn run<C: ChainClient>(
    ctx: &mut TaskContext<'_, C>,
    skip_registry: bool,
) -> eyre::Result<AddressProviderReport> {
    let market_id = ctx.market.market_id.clone();
    let args = Bytes::from((market_id.clone(),).abi_encode_params());
    let provider_addr = ctx
        .deploy_and_record(names::ADDRESSES_PROVIDER, names::ADDRESSES_PROVIDER, args)
        .await?;
    tracing::info!(%provider_addr, %market_id, "addresses provider deployed");

    let (registry, provider_id) = if skip_registry {
        (None, None)
    } else {
        let (r, id) = register(ctx, provider_addr).await?;
        (Some(r), Some(id))
    };

    let provider = AddressesProvider::new(ctx.client, provider_addr);
    provider.set_pool_admin(ctx.pool_admin()).await?;
    provider.set_emergency_admin(ctx.emergency_admin()).await?;

    let pool_admin = provider.pool_admin().await?;
    let emergency_admin = provider.emergency_admin().await?;
    tracing::info!(%pool_admin, "Pool Admin");
    tracing::info!(%emergency_admin, "Emergency Admin");

    Ok(AddressProviderReport {
        provider: provider_addr,
        registry,
        provider_id,
        pool_admin,
        emergency_admin,
    })
}
