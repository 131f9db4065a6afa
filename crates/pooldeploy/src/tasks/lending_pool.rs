//! Lending pool and configurator proxies, plus the two deployment helpers that later batch
//! steps run through.

use super::TaskContext;
use crate::client::ChainClient;
use crate::config::on_network;
use crate::contracts::{names, AddressesProvider};
use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolValue as _;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LendingPoolReport {
    pub lending_pool_impl: Address,
    pub lending_pool: Address,
    pub configurator_impl: Address,
    pub configurator: Address,
    pub stable_and_variable_tokens_helper: Address,
    pub atokens_and_rates_helper: Address,
}

pub async fn run<C: ChainClient>(ctx: &mut TaskContext<'_, C>) -> eyre::Result<LendingPoolReport> {
    let provider_addr = ctx.require(names::ADDRESSES_PROVIDER)?;
    let provider = AddressesProvider::new(ctx.client, provider_addr);

    let lending_pool_impl = match on_network(&ctx.market.lending_pool_impl, ctx.network) {
        Some(a) => {
            tracing::info!(address = %a, "using configured lending pool implementation");
            a
        }
        None => {
            ctx.deploy_and_record(names::LENDING_POOL_IMPL, names::LENDING_POOL, Bytes::new())
                .await?
        }
    };
    provider.set_lending_pool_impl(lending_pool_impl).await?;
    let lending_pool = provider.lending_pool().await?;
    if lending_pool.is_zero() {
        eyre::bail!("addresses provider returned no lending pool proxy after setLendingPoolImpl");
    }
    ctx.record(names::LENDING_POOL, lending_pool)?;

    let configurator_impl = ctx
        .deploy_and_record(names::CONFIGURATOR_IMPL, names::CONFIGURATOR, Bytes::new())
        .await?;
    provider
        .set_lending_pool_configurator_impl(configurator_impl)
        .await?;
    let configurator = provider.lending_pool_configurator().await?;
    if configurator.is_zero() {
        eyre::bail!(
            "addresses provider returned no configurator proxy after setLendingPoolConfiguratorImpl"
        );
    }
    ctx.record(names::CONFIGURATOR, configurator)?;

    let stable_and_variable_tokens_helper = ctx
        .deploy_and_record(
            names::STABLE_AND_VARIABLE_TOKENS_HELPER,
            names::STABLE_AND_VARIABLE_TOKENS_HELPER,
            Bytes::from((lending_pool, provider_addr).abi_encode_params()),
        )
        .await?;
    let atokens_and_rates_helper = ctx
        .deploy_and_record(
            names::ATOKENS_AND_RATES_HELPER,
            names::ATOKENS_AND_RATES_HELPER,
            Bytes::from((lending_pool, provider_addr, configurator).abi_encode_params()),
        )
        .await?;

    Ok(LendingPoolReport {
        lending_pool_impl,
        lending_pool,
        configurator_impl,
        configurator,
        stable_and_variable_tokens_helper,
        atokens_and_rates_helper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_book::AddressBook;
    use crate::client::testing::{configurator_proxy, lending_pool_proxy, Event, RecordingClient};
    use crate::config::MarketConfig;
    use crate::errors::DeployError;

    const NET: &str = "localhost";

    fn signer() -> Address {
        Address::with_last_byte(0xd0)
    }

    #[tokio::test]
    async fn wires_pool_and_configurator_then_deploys_helpers() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = AddressBook::open(&dir.path().join("book.json"))?;
        let provider = Address::with_last_byte(0x50);
        book.insert(names::ADDRESSES_PROVIDER, NET, provider, None)?;
        let client = RecordingClient::new(signer(), signer());
        let market = MarketConfig::new("m");
        let mut ctx = TaskContext {
            client: &client,
            network: NET,
            market: &market,
            book: &mut book,
            verify: false,
        };

        let report = run(&mut ctx).await?;

        assert_eq!(
            client.deployed_contracts()?,
            vec![
                names::LENDING_POOL.to_owned(),
                names::CONFIGURATOR.to_owned(),
                names::STABLE_AND_VARIABLE_TOKENS_HELPER.to_owned(),
                names::ATOKENS_AND_RATES_HELPER.to_owned(),
            ]
        );
        assert_eq!(report.lending_pool, lending_pool_proxy());
        assert_eq!(report.configurator, configurator_proxy());
        assert_eq!(book.get(names::LENDING_POOL, NET), Some(lending_pool_proxy()));
        assert_eq!(book.get(names::CONFIGURATOR, NET), Some(configurator_proxy()));

        let events = client.events()?;
        let Some(Event::Deploy { args, .. }) = events.iter().rev().find(
            |e| matches!(e, Event::Deploy { contract, .. } if contract == names::ATOKENS_AND_RATES_HELPER),
        ) else {
            eyre::bail!("helper deploy missing");
        };
        let decoded = <(Address, Address, Address)>::abi_decode_params(args)?;
        assert_eq!(decoded, (lending_pool_proxy(), provider, configurator_proxy()));
        Ok(())
    }

    #[tokio::test]
    async fn configured_pool_impl_is_not_redeployed() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = AddressBook::open(&dir.path().join("book.json"))?;
        book.insert(names::ADDRESSES_PROVIDER, NET, Address::with_last_byte(0x50), None)?;
        let client = RecordingClient::new(signer(), signer());
        let mut market = MarketConfig::new("m");
        let pool_impl = Address::with_last_byte(0x66);
        market.lending_pool_impl.insert(NET.into(), pool_impl);
        let mut ctx = TaskContext {
            client: &client,
            network: NET,
            market: &market,
            book: &mut book,
            verify: false,
        };

        let report = run(&mut ctx).await?;
        assert_eq!(report.lending_pool_impl, pool_impl);
        assert!(!client
            .deployed_contracts()?
            .iter()
            .any(|c| c == names::LENDING_POOL));
        Ok(())
    }

    #[tokio::test]
    async fn missing_provider_is_a_typed_error() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = AddressBook::open(&dir.path().join("book.json"))?;
        let client = RecordingClient::new(signer(), signer());
        let market = MarketConfig::new("m");
        let mut ctx = TaskContext {
            client: &client,
            network: NET,
            market: &market,
            book: &mut book,
            verify: false,
        };
        let err = run(&mut ctx)
            .await
            .err()
            .ok_or_else(|| eyre::eyre!("expected failure"))?;
        assert_eq!(
            err.downcast_ref::<DeployError>(),
            Some(&DeployError::MissingAddress {
                key: "LendingPoolAddressesProvider.localhost".into()
            })
        );
        Ok(())
    }
}
