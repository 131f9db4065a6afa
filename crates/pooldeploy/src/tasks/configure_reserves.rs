//! Collateral and borrowing parameters, applied through `ATokensAndRatesHelper` while it
//! temporarily holds the pool admin role.

use super::{submit_in_chunks, total_gas, ChunkReport, TaskContext};
use crate::admin::with_pool_admin;
use crate::client::ChainClient;
use crate::config::on_network;
use crate::contracts::{names, ATokensAndRatesHelper, AddressesProvider, ProtocolDataProvider};
use crate::reserves::{addressed_reserves, ConfigureReserveRecord, RecordSet, SkipReason, Skipped};
use alloy::primitives::Address;
use eyre::Context as _;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ConfigureReport {
    pub network: String,
    pub helper: Address,
    pub chunks: Vec<ChunkReport>,
    pub skipped: Vec<Skipped>,
    pub total_gas_used: u64,
}

async fn collect_records<C: ChainClient>(
    ctx: &TaskContext<'_, C>,
    data_provider: &ProtocolDataProvider<'_, C>,
) -> eyre::Result<RecordSet<ConfigureReserveRecord>> {
    let tokens = ctx.market.tokens_on(ctx.network);
    let mut set = RecordSet::default();
    for (symbol, params, asset) in addressed_reserves(&ctx.market.reserves, &tokens, &mut set.skipped)
    {
        if !params.usable_as_collateral() {
            tracing::info!(%symbol, "skipping {symbol}: not usable as collateral");
            set.skip(symbol, SkipReason::NotCollateral);
            continue;
        }
        let current = data_provider
            .reserve_configuration(asset)
            .await
            .with_context(|| format!("read reserve configuration of {symbol}"))?;
        if current.usage_as_collateral_enabled {
            tracing::info!(
                %symbol,
                ltv = %current.ltv,
                "Reserve {symbol} is already enabled as collateral, skipping"
            );
            set.skip(symbol, SkipReason::AlreadyEnabledAsCollateral);
            continue;
        }
        let record = ConfigureReserveRecord::from_params(asset, params)
            .with_context(|| format!("configure record for {symbol}"))?;
        set.records.push((symbol.to_owned(), record));
    }
    Ok(set)
}

pub async fn run<C: ChainClient>(ctx: &mut TaskContext<'_, C>) -> eyre::Result<ConfigureReport> {
    let provider_addr = ctx.require(names::ADDRESSES_PROVIDER)?;
    let helper_addr = ctx.require(names::ATOKENS_AND_RATES_HELPER)?;
    let data_provider_addr = match on_network(&ctx.market.data_provider, ctx.network) {
        Some(a) => a,
        None => ctx.require(names::DATA_PROVIDER)?,
    };

    let data_provider = ProtocolDataProvider::new(ctx.client, data_provider_addr);
    let set = collect_records(ctx, &data_provider).await?;

    if set.records.is_empty() {
        tracing::info!("no reserves left to configure; pool admin untouched");
        return Ok(ConfigureReport {
            network: ctx.network.to_owned(),
            helper: helper_addr,
            chunks: Vec::new(),
            skipped: set.skipped,
            total_gas_used: 0,
        });
    }

    let size = ctx.market.configure_chunk_size;
    let gas_limit = ctx.market.configure_gas_limit;
    let provider = AddressesProvider::new(ctx.client, provider_addr);
    let helper = ATokensAndRatesHelper::new(ctx.client, helper_addr);

    // The role goes back to whoever held it before the run, not to what the config says.
    let holder = provider.pool_admin().await.context("read current pool admin")?;
    let configured = ctx.pool_admin();
    if holder != configured {
        tracing::warn!(
            %holder,
            %configured,
            "on-chain pool admin differs from the configured one; restoring to the on-chain holder"
        );
    }

    let chunks = with_pool_admin(&provider, helper_addr, holder, || {
        submit_in_chunks(&set.records, size, "Init for:", |batch| {
            let helper = &helper;
            async move { helper.configure_reserves(&batch, gas_limit).await }
        })
    })
    .await?;

    let total_gas_used = total_gas(&chunks);
    Ok(ConfigureReport {
        network: ctx.network.to_owned(),
        helper: helper_addr,
        chunks,
        skipped: set.skipped,
        total_gas_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_book::AddressBook;
    use crate::chunk::ChunkSize;
    use crate::client::testing::RecordingClient;
    use crate::config::MarketConfig;
    use crate::errors::DeployError;
    use crate::reserves::fixtures::{four_assets, reserve};
    use crate::reserves::TokenAddressTable;
    use alloy::sol_types::SolCall as _;

    const NET: &str = "localhost";

    fn admin() -> Address {
        Address::with_last_byte(0xad)
    }

    fn helper() -> Address {
        Address::with_last_byte(0x4e)
    }

    fn book(dir: &tempfile::TempDir) -> eyre::Result<AddressBook> {
        let mut b = AddressBook::open(&dir.path().join("book.json"))?;
        b.insert(names::ADDRESSES_PROVIDER, NET, Address::with_last_byte(0x50), None)?;
        b.insert(names::ATOKENS_AND_RATES_HELPER, NET, helper(), None)?;
        b.insert(names::DATA_PROVIDER, NET, Address::with_last_byte(0x5d), None)?;
        Ok(b)
    }

    fn market() -> MarketConfig {
        let (reserves, tokens) = four_assets();
        let mut m = MarketConfig::new("Aave genesis market");
        m.reserves = reserves;
        m.reserve_assets.insert(NET.into(), tokens);
        m
    }

    /// Ten collateral assets T00..T09 at addresses 0x10..0x19.
    fn ten_assets() -> MarketConfig {
        let mut m = MarketConfig::new("m");
        let mut tokens = TokenAddressTable::new();
        for i in 0_u8..10 {
            let sym = format!("T{i:02}");
            m.reserves.insert(sym.clone(), reserve("s", "5000"));
            tokens.insert(sym, Address::with_last_byte(0x10 + i));
        }
        m.reserve_assets.insert(NET.into(), tokens);
        m
    }

    #[tokio::test]
    async fn admin_is_lent_to_helper_around_the_batches() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = book(&dir)?;
        let client = RecordingClient::new(admin(), admin());
        let market = market();
        let mut ctx = TaskContext {
            client: &client,
            network: NET,
            market: &market,
            book: &mut book,
            verify: false,
        };

        let report = run(&mut ctx).await?;

        assert_eq!(client.admin_changes()?, vec![helper(), admin()]);
        assert_eq!(client.configure_batches()?.len(), 1, "four records, chunk size 20");
        assert_eq!(report.chunks.len(), 1);

        let sends = client.sends()?;
        let first = sends.first().ok_or_else(|| eyre::eyre!("no sends"))?;
        let last = sends.last().ok_or_else(|| eyre::eyre!("no sends"))?;
        assert!(
            crate::contracts::ILendingPoolAddressesProvider::setPoolAdminCall::abi_decode(&first.1)
                .is_ok(),
            "elevation precedes the first batch"
        );
        assert!(
            crate::contracts::ILendingPoolAddressesProvider::setPoolAdminCall::abi_decode(&last.1)
                .is_ok(),
            "restore follows the last batch"
        );
        let batch = sends
            .iter()
            .find(|(to, _, _)| *to == helper())
            .ok_or_else(|| eyre::eyre!("no batch to helper"))?;
        assert_eq!(batch.2, Some(12_000_000), "explicit gas ceiling");
        Ok(())
    }

    #[tokio::test]
    async fn non_collateral_and_already_enabled_assets_are_excluded() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = book(&dir)?;
        let mut market = market();
        if let Some(bat) = market.reserves.get_mut("BAT") {
            bat.base_ltv_as_collateral = "-1".into();
        }
        // DAI is 0x..04 in the fixture.
        let client =
            RecordingClient::new(admin(), admin()).with_collateral_enabled(Address::with_last_byte(4));
        let mut ctx = TaskContext {
            client: &client,
            network: NET,
            market: &market,
            book: &mut book,
            verify: false,
        };

        let report = run(&mut ctx).await?;

        assert_eq!(
            client.configure_batches()?,
            vec![vec![Address::with_last_byte(1), Address::with_last_byte(3)]]
        );
        let reasons: Vec<(&str, SkipReason)> = report
            .skipped
            .iter()
            .map(|s| (s.symbol.as_str(), s.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("BAT", SkipReason::NotCollateral),
                ("DAI", SkipReason::AlreadyEnabledAsCollateral)
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn role_returns_to_the_holder_read_before_elevation() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = book(&dir)?;
        let guardian = Address::with_last_byte(0x99);
        let client = RecordingClient::new(admin(), guardian);
        let market = market();
        let mut ctx = TaskContext {
            client: &client,
            network: NET,
            market: &market,
            book: &mut book,
            verify: false,
        };

        run(&mut ctx).await?;

        assert_eq!(client.admin_changes()?, vec![helper(), guardian]);
        assert_eq!(client.pool_admin()?, guardian, "config said 0x..ad, chain said 0x..99");
        Ok(())
    }

    #[tokio::test]
    async fn asset_without_token_address_is_skipped() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = book(&dir)?;
        let mut market = market();
        if let Some(t) = market.reserve_assets.get_mut(NET) {
            t.remove("BAT");
        }
        let client = RecordingClient::new(admin(), admin());
        let mut ctx = TaskContext {
            client: &client,
            network: NET,
            market: &market,
            book: &mut book,
            verify: false,
        };

        let report = run(&mut ctx).await?;

        assert_eq!(
            client.configure_batches()?,
            vec![vec![
                Address::with_last_byte(1),
                Address::with_last_byte(3),
                Address::with_last_byte(4)
            ]],
            "BAT (0x..02) is never configured"
        );
        assert_eq!(
            report
                .skipped
                .iter()
                .map(|s| (s.symbol.as_str(), s.reason))
                .collect::<Vec<_>>(),
            vec![("BAT", SkipReason::MissingTokenAddress)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn nothing_to_configure_leaves_admin_alone() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = book(&dir)?;
        let mut market = market();
        for p in market.reserves.values_mut() {
            p.base_ltv_as_collateral = "-1".into();
        }
        let client = RecordingClient::new(admin(), admin());
        let mut ctx = TaskContext {
            client: &client,
            network: NET,
            market: &market,
            book: &mut book,
            verify: false,
        };

        let report = run(&mut ctx).await?;
        assert!(report.chunks.is_empty());
        assert!(client.sends()?.is_empty(), "no admin toggling, no batches");
        Ok(())
    }

    #[tokio::test]
    async fn chunk_two_of_five_fails_and_admin_is_still_restored() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = book(&dir)?;
        let mut market = ten_assets();
        market.configure_chunk_size = ChunkSize::new(2)?;
        let client = RecordingClient::new(admin(), admin()).failing_on_batch(2);
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
            client.configure_batches()?.len(),
            2,
            "chunks 3, 4 and 5 never submitted"
        );
        assert_eq!(
            err.downcast_ref::<DeployError>(),
            Some(&DeployError::ChunkFailed {
                index: 2,
                total: 5,
                unapplied: (2..10).map(|i| format!("T{i:02}")).collect(),
            })
        );
        assert_eq!(client.admin_changes()?, vec![helper(), admin()]);
        assert_eq!(client.pool_admin()?, admin());
        Ok(())
    }
}
