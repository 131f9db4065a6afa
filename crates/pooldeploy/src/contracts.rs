//! ABI bindings for the protocol contracts this tool drives, and thin typed handles that
//! encode calls and decode results over any [`ChainClient`].

use crate::client::{ChainClient, Deployed, TxOutcome};
use crate::reserves::{ConfigureReserveRecord, InitReserveRecord, StrategyParams};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::{SolCall, SolValue as _},
};
use eyre::Context as _;

sol! {
    interface ILendingPoolAddressesProvider {
        function getPoolAdmin() external view returns (address);
        function setPoolAdmin(address admin) external;
        function getEmergencyAdmin() external view returns (address);
        function setEmergencyAdmin(address emergencyAdmin) external;
        function getLendingPool() external view returns (address);
        function setLendingPoolImpl(address pool) external;
        function getLendingPoolConfigurator() external view returns (address);
        function setLendingPoolConfiguratorImpl(address configurator) external;
    }
}

sol! {
    interface ILendingPoolAddressesProviderRegistry {
        function getAddressesProvidersList() external view returns (address[]);
        function registerAddressesProvider(address provider, uint256 id) external;
    }
}

sol! {
    interface ILendingPoolConfigurator {
        struct InitReserveInput {
            address aTokenImpl;
            address stableDebtTokenImpl;
            address variableDebtTokenImpl;
            uint8 underlyingAssetDecimals;
            address interestRateStrategyAddress;
            address underlyingAsset;
            address treasury;
            address incentivesController;
            string underlyingAssetName;
            string aTokenName;
            string aTokenSymbol;
            string variableDebtTokenName;
            string variableDebtTokenSymbol;
            string stableDebtTokenName;
            string stableDebtTokenSymbol;
            bytes params;
        }
        function batchInitReserve(InitReserveInput[] input) external;
    }
}

sol! {
    interface IATokensAndRatesHelper {
        struct ConfigureReserveInput {
            address asset;
            uint256 baseLTV;
            uint256 liquidationThreshold;
            uint256 liquidationBonus;
            uint256 reserveFactor;
            bool stableBorrowingEnabled;
            bool borrowingEnabled;
        }
        function configureReserves(ConfigureReserveInput[] inputParams) external;
    }
}

sol! {
    interface IAaveProtocolDataProvider {
        function getReserveConfigurationData(address asset)
            external
            view
            returns (
                uint256 decimals,
                uint256 ltv,
                uint256 liquidationThreshold,
                uint256 liquidationBonus,
                uint256 reserveFactor,
                bool usageAsCollateralEnabled,
                bool borrowingEnabled,
                bool stableBorrowRateEnabled,
                bool isActive,
                bool isFrozen
            );
    }
}

/// Contract names as they appear in compiled artifacts and in the address book.
pub mod names {
    pub const ADDRESSES_PROVIDER: &str = "LendingPoolAddressesProvider";
    pub const PROVIDER_REGISTRY: &str = "LendingPoolAddressesProviderRegistry";
    pub const LENDING_POOL: &str = "LendingPool";
    pub const LENDING_POOL_IMPL: &str = "LendingPoolImpl";
    pub const CONFIGURATOR: &str = "LendingPoolConfigurator";
    pub const CONFIGURATOR_IMPL: &str = "LendingPoolConfiguratorImpl";
    pub const STABLE_AND_VARIABLE_TOKENS_HELPER: &str = "StableAndVariableTokensHelper";
    pub const ATOKENS_AND_RATES_HELPER: &str = "ATokensAndRatesHelper";
    pub const DATA_PROVIDER: &str = "AaveProtocolDataProvider";
    pub const RATE_STRATEGY: &str = "DefaultReserveInterestRateStrategy";
    pub const ATOKEN: &str = "AToken";
    pub const DELEGATION_AWARE_ATOKEN: &str = "DelegationAwareAToken";
    pub const STABLE_DEBT_TOKEN: &str = "StableDebtToken";
    pub const VARIABLE_DEBT_TOKEN: &str = "VariableDebtToken";

    /// Address-book keys of the token implementations.
    pub const ATOKEN_IMPL_KEY: &str = "aTokenImpl";
    pub const DELEGATION_AWARE_ATOKEN_IMPL_KEY: &str = "delegationAwareATokenImpl";
    pub const STABLE_DEBT_TOKEN_IMPL_KEY: &str = "stableDebtTokenImpl";
    pub const VARIABLE_DEBT_TOKEN_IMPL_KEY: &str = "variableDebtTokenImpl";
}

async fn read_call<C: ChainClient, K: SolCall>(
    client: &C,
    to: Address,
    call: &K,
) -> eyre::Result<K::Return> {
    let out = client
        .read(to, Bytes::from(call.abi_encode()))
        .await
        .with_context(|| format!("call {}", K::SIGNATURE))?;
    K::abi_decode_returns(&out).with_context(|| format!("decode {}", K::SIGNATURE))
}

async fn write_call<C: ChainClient, K: SolCall>(
    client: &C,
    to: Address,
    call: &K,
    gas_limit: Option<u64>,
) -> eyre::Result<TxOutcome> {
    client
        .send(to, Bytes::from(call.abi_encode()), gas_limit)
        .await
        .with_context(|| format!("send {}", K::SIGNATURE))
}

pub struct AddressesProvider<'a, C> {
    client: &'a C,
    pub address: Address,
}

impl<'a, C: ChainClient> AddressesProvider<'a, C> {
    pub const fn new(client: &'a C, address: Address) -> Self {
        Self { client, address }
    }

    pub async fn pool_admin(&self) -> eyre::Result<Address> {
        read_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProvider::getPoolAdminCall {},
        )
        .await
    }

    pub async fn set_pool_admin(&self, admin: Address) -> eyre::Result<TxOutcome> {
        write_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProvider::setPoolAdminCall { admin },
            None,
        )
        .await
    }

    pub async fn emergency_admin(&self) -> eyre::Result<Address> {
        read_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProvider::getEmergencyAdminCall {},
        )
        .await
    }

    pub async fn set_emergency_admin(&self, emergency_admin: Address) -> eyre::Result<TxOutcome> {
        write_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProvider::setEmergencyAdminCall {
                emergencyAdmin: emergency_admin,
            },
            None,
        )
        .await
    }

    pub async fn lending_pool(&self) -> eyre::Result<Address> {
        read_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProvider::getLendingPoolCall {},
        )
        .await
    }

    pub async fn set_lending_pool_impl(&self, pool: Address) -> eyre::Result<TxOutcome> {
        write_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProvider::setLendingPoolImplCall { pool },
            None,
        )
        .await
    }

    pub async fn lending_pool_configurator(&self) -> eyre::Result<Address> {
        read_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProvider::getLendingPoolConfiguratorCall {},
        )
        .await
    }

    pub async fn set_lending_pool_configurator_impl(
        &self,
        configurator: Address,
    ) -> eyre::Result<TxOutcome> {
        write_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProvider::setLendingPoolConfiguratorImplCall { configurator },
            None,
        )
        .await
    }
}

pub struct ProviderRegistry<'a, C> {
    client: &'a C,
    pub address: Address,
}

impl<'a, C: ChainClient> ProviderRegistry<'a, C> {
    pub const fn new(client: &'a C, address: Address) -> Self {
        Self { client, address }
    }

    pub async fn providers(&self) -> eyre::Result<Vec<Address>> {
        read_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProviderRegistry::getAddressesProvidersListCall {},
        )
        .await
    }

    pub async fn register(&self, provider: Address, id: u64) -> eyre::Result<TxOutcome> {
        write_call(
            self.client,
            self.address,
            &ILendingPoolAddressesProviderRegistry::registerAddressesProviderCall {
                provider,
                id: U256::from(id),
            },
            None,
        )
        .await
    }
}

impl From<&InitReserveRecord> for ILendingPoolConfigurator::InitReserveInput {
    fn from(r: &InitReserveRecord) -> Self {
        Self {
            aTokenImpl: r.a_token_impl,
            stableDebtTokenImpl: r.stable_debt_token_impl,
            variableDebtTokenImpl: r.variable_debt_token_impl,
            underlyingAssetDecimals: r.underlying_asset_decimals,
            interestRateStrategyAddress: r.interest_rate_strategy_address,
            underlyingAsset: r.underlying_asset,
            treasury: r.treasury,
            incentivesController: r.incentives_controller,
            underlyingAssetName: r.underlying_asset_name.clone(),
            aTokenName: r.a_token_name.clone(),
            aTokenSymbol: r.a_token_symbol.clone(),
            variableDebtTokenName: r.variable_debt_token_name.clone(),
            variableDebtTokenSymbol: r.variable_debt_token_symbol.clone(),
            stableDebtTokenName: r.stable_debt_token_name.clone(),
            stableDebtTokenSymbol: r.stable_debt_token_symbol.clone(),
            params: r.params.clone(),
        }
    }
}

impl From<&ConfigureReserveRecord> for IATokensAndRatesHelper::ConfigureReserveInput {
    fn from(r: &ConfigureReserveRecord) -> Self {
        Self {
            asset: r.asset,
            baseLTV: r.base_ltv,
            liquidationThreshold: r.liquidation_threshold,
            liquidationBonus: r.liquidation_bonus,
            reserveFactor: r.reserve_factor,
            stableBorrowingEnabled: r.stable_borrowing_enabled,
            borrowingEnabled: r.borrowing_enabled,
        }
    }
}

pub struct Configurator<'a, C> {
    client: &'a C,
    pub address: Address,
}

impl<'a, C: ChainClient> Configurator<'a, C> {
    pub const fn new(client: &'a C, address: Address) -> Self {
        Self { client, address }
    }

    pub async fn batch_init_reserve<'r>(
        &self,
        records: impl IntoIterator<Item = &'r InitReserveRecord>,
    ) -> eyre::Result<TxOutcome> {
        let input = records.into_iter().map(Into::into).collect();
        write_call(
            self.client,
            self.address,
            &ILendingPoolConfigurator::batchInitReserveCall { input },
            None,
        )
        .await
    }
}

pub struct ATokensAndRatesHelper<'a, C> {
    client: &'a C,
    pub address: Address,
}

impl<'a, C: ChainClient> ATokensAndRatesHelper<'a, C> {
    pub const fn new(client: &'a C, address: Address) -> Self {
        Self { client, address }
    }

    pub async fn configure_reserves<'r>(
        &self,
        records: impl IntoIterator<Item = &'r ConfigureReserveRecord>,
        gas_limit: u64,
    ) -> eyre::Result<TxOutcome> {
        let input_params = records.into_iter().map(Into::into).collect();
        write_call(
            self.client,
            self.address,
            &IATokensAndRatesHelper::configureReservesCall {
                inputParams: input_params,
            },
            Some(gas_limit),
        )
        .await
    }
}

/// On-chain configuration flags of one reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveConfiguration {
    pub ltv: U256,
    pub usage_as_collateral_enabled: bool,
}

pub struct ProtocolDataProvider<'a, C> {
    client: &'a C,
    pub address: Address,
}

impl<'a, C: ChainClient> ProtocolDataProvider<'a, C> {
    pub const fn new(client: &'a C, address: Address) -> Self {
        Self { client, address }
    }

    pub async fn reserve_configuration(&self, asset: Address) -> eyre::Result<ReserveConfiguration> {
        let r = read_call(
            self.client,
            self.address,
            &IAaveProtocolDataProvider::getReserveConfigurationDataCall { asset },
        )
        .await?;
        Ok(ReserveConfiguration {
            ltv: r.ltv,
            usage_as_collateral_enabled: r.usageAsCollateralEnabled,
        })
    }
}

/// `DefaultReserveInterestRateStrategy(provider, optimal, base, vSlope1, vSlope2, sSlope1, sSlope2)`
pub fn strategy_constructor_args(
    provider: Address,
    s: &StrategyParams,
) -> eyre::Result<Bytes> {
    use crate::reserves::parse_uint;
    let args = (
        provider,
        parse_uint("optimal_utilization_rate", &s.optimal_utilization_rate)?,
        parse_uint("base_variable_borrow_rate", &s.base_variable_borrow_rate)?,
        parse_uint("variable_rate_slope1", &s.variable_rate_slope1)?,
        parse_uint("variable_rate_slope2", &s.variable_rate_slope2)?,
        parse_uint("stable_rate_slope1", &s.stable_rate_slope1)?,
        parse_uint("stable_rate_slope2", &s.stable_rate_slope2)?,
    );
    Ok(Bytes::from(args.abi_encode_params()))
}

/// Deploy `contract` and log whether source verification was requested.
pub async fn deploy_contract<C: ChainClient>(
    client: &C,
    contract: &str,
    constructor_args: Bytes,
    verify: bool,
) -> eyre::Result<Deployed> {
    let d = client.deploy(contract, constructor_args).await?;
    if verify {
        tracing::info!(
            contract,
            address = %d.address,
            "verification requested; submit sources to the explorer separately"
        );
    }
    Ok(d)
}
