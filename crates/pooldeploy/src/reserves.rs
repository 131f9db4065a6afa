//! Reserve parameters from config and the per-asset records built from them.

use alloy::primitives::{Address, Bytes, U256};
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// LTV value that marks a reserve as unusable as collateral.
pub const NOT_COLLATERAL_LTV: &str = "-1";

/// Encoded reserve params passed to `batchInitReserve` for every reserve.
pub const DEFAULT_INIT_PARAMS: [u8; 1] = [0x10];

/// Symbol -> underlying token address, for one network.
pub type TokenAddressTable = BTreeMap<String, Address>;

/// Symbol -> parameters. Ordered, so runs are reproducible.
pub type ReserveTable = BTreeMap<String, ReserveParams>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ATokenImpl {
    #[default]
    AToken,
    DelegationAwareAToken,
}

/// Coefficients of a `DefaultReserveInterestRateStrategy`, as decimal ray strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Strategies sharing a name are deployed once and shared.
    pub name: String,
    pub optimal_utilization_rate: String,
    pub base_variable_borrow_rate: String,
    pub variable_rate_slope1: String,
    pub variable_rate_slope2: String,
    pub stable_rate_slope1: String,
    pub stable_rate_slope2: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveParams {
    pub strategy: StrategyParams,
    #[serde(default)]
    pub a_token_impl: ATokenImpl,
    pub reserve_decimals: u8,
    /// Basis points, or `"-1"` when the asset cannot back loans.
    pub base_ltv_as_collateral: String,
    pub liquidation_threshold: String,
    pub liquidation_bonus: String,
    pub reserve_factor: String,
    pub borrowing_enabled: bool,
    pub stable_borrow_rate_enabled: bool,
}

impl ReserveParams {
    pub fn usable_as_collateral(&self) -> bool {
        self.base_ltv_as_collateral.trim() != NOT_COLLATERAL_LTV
    }
}

pub fn parse_uint(field: &str, s: &str) -> eyre::Result<U256> {
    U256::from_str_radix(s.trim(), 10).with_context(|| format!("{field}: not a uint: {s:?}"))
}

/// Display-name templates for the three tokens deployed per reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamePrefixes {
    pub a_token_name_prefix: String,
    pub stable_debt_token_name_prefix: String,
    pub variable_debt_token_name_prefix: String,
    pub symbol_prefix: String,
}

impl Default for NamePrefixes {
    fn default() -> Self {
        Self {
            a_token_name_prefix: "Aave interest bearing".into(),
            stable_debt_token_name_prefix: "Aave stable debt bearing".into(),
            variable_debt_token_name_prefix: "Aave variable debt bearing".into(),
            symbol_prefix: String::new(),
        }
    }
}

/// Token implementation contracts the configurator clones for every new reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplementationSet {
    pub a_token: Address,
    /// Only deployed when some reserve asks for it.
    pub delegation_aware_a_token: Option<Address>,
    pub stable_debt_token: Address,
    pub variable_debt_token: Address,
}

impl ImplementationSet {
    pub fn a_token_for(&self, kind: ATokenImpl) -> eyre::Result<Address> {
        match kind {
            ATokenImpl::AToken => Ok(self.a_token),
            ATokenImpl::DelegationAwareAToken => self
                .delegation_aware_a_token
                .ok_or_else(|| eyre::eyre!("delegation-aware aToken implementation not resolved")),
        }
    }
}

/// One entry of a `batchInitReserve` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReserveRecord {
    pub a_token_impl: Address,
    pub stable_debt_token_impl: Address,
    pub variable_debt_token_impl: Address,
    #[serde(deserialize_with = "u8_from_number_or_string")]
    pub underlying_asset_decimals: u8,
    pub interest_rate_strategy_address: Address,
    pub underlying_asset: Address,
    pub treasury: Address,
    pub incentives_controller: Address,
    pub underlying_asset_name: String,
    pub a_token_name: String,
    pub a_token_symbol: String,
    pub variable_debt_token_name: String,
    pub variable_debt_token_symbol: String,
    pub stable_debt_token_name: String,
    pub stable_debt_token_symbol: String,
    pub params: Bytes,
}

/// Hand-written batch files often quote numbers (`"18"`); accept both forms.
fn u8_from_number_or_string<'de, D>(d: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u8),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// One entry of a `configureReserves` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureReserveRecord {
    pub asset: Address,
    #[serde(rename = "baseLTV")]
    pub base_ltv: U256,
    pub liquidation_threshold: U256,
    pub liquidation_bonus: U256,
    pub reserve_factor: U256,
    pub stable_borrowing_enabled: bool,
    pub borrowing_enabled: bool,
}

impl ConfigureReserveRecord {
    pub fn from_params(asset: Address, p: &ReserveParams) -> eyre::Result<Self> {
        Ok(Self {
            asset,
            base_ltv: parse_uint("base_ltv_as_collateral", &p.base_ltv_as_collateral)?,
            liquidation_threshold: parse_uint("liquidation_threshold", &p.liquidation_threshold)?,
            liquidation_bonus: parse_uint("liquidation_bonus", &p.liquidation_bonus)?,
            reserve_factor: parse_uint("reserve_factor", &p.reserve_factor)?,
            stable_borrowing_enabled: p.stable_borrow_rate_enabled,
            borrowing_enabled: p.borrowing_enabled,
        })
    }
}

/// Why an asset was left out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingTokenAddress,
    NotCollateral,
    AlreadyEnabledAsCollateral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub symbol: String,
    pub reason: SkipReason,
}

/// Records ready to submit, each paired with its symbol, plus the assets left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet<R> {
    pub records: Vec<(String, R)>,
    pub skipped: Vec<Skipped>,
}

impl<R> Default for RecordSet<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<R> RecordSet<R> {
    pub fn skip(&mut self, symbol: &str, reason: SkipReason) {
        self.skipped.push(Skipped {
            symbol: symbol.to_owned(),
            reason,
        });
    }
}

/// A reserve with a usable token address: symbol, parameters, underlying asset.
pub type AddressedReserve<'a> = (&'a str, &'a ReserveParams, Address);

/// Reserves that have a token address on this network, in table order. Assets without one
/// are logged and reported as skipped.
pub fn addressed_reserves<'a>(
    reserves: &'a ReserveTable,
    tokens: &TokenAddressTable,
    skipped: &mut Vec<Skipped>,
) -> Vec<AddressedReserve<'a>> {
    let mut out = Vec::with_capacity(reserves.len());
    for (symbol, params) in reserves {
        match tokens.get(symbol).filter(|a| !a.is_zero()) {
            Some(addr) => out.push((symbol.as_str(), params, *addr)),
            None => {
                tracing::info!(
                    %symbol,
                    "skipping {symbol}: token address is not set in the market config"
                );
                skipped.push(Skipped {
                    symbol: symbol.clone(),
                    reason: SkipReason::MissingTokenAddress,
                });
            }
        }
    }
    out
}

/// Everything `build_init_records` needs besides the tables themselves.
#[derive(Debug, Clone)]
pub struct InitRecordContext<'a> {
    pub prefixes: &'a NamePrefixes,
    pub implementations: &'a ImplementationSet,
    /// Deployed strategy address per strategy name.
    pub strategies: &'a BTreeMap<String, Address>,
    pub treasury: Address,
    pub incentives_controller: Address,
}

pub fn build_init_record(
    symbol: &str,
    params: &ReserveParams,
    underlying: Address,
    ctx: &InitRecordContext<'_>,
) -> eyre::Result<InitReserveRecord> {
    let strategy = ctx
        .strategies
        .get(&params.strategy.name)
        .copied()
        .ok_or_else(|| eyre::eyre!("no strategy deployed for {}", params.strategy.name))?;
    let p = ctx.prefixes;
    let sp = &p.symbol_prefix;
    Ok(InitReserveRecord {
        a_token_impl: ctx.implementations.a_token_for(params.a_token_impl)?,
        stable_debt_token_impl: ctx.implementations.stable_debt_token,
        variable_debt_token_impl: ctx.implementations.variable_debt_token,
        underlying_asset_decimals: params.reserve_decimals,
        interest_rate_strategy_address: strategy,
        underlying_asset: underlying,
        treasury: ctx.treasury,
        incentives_controller: ctx.incentives_controller,
        underlying_asset_name: symbol.to_owned(),
        a_token_name: format!("{} {symbol}", p.a_token_name_prefix),
        a_token_symbol: format!("a{sp}{symbol}"),
        variable_debt_token_name: format!("{} {sp}{symbol}", p.variable_debt_token_name_prefix),
        variable_debt_token_symbol: format!("variableDebt{sp}{symbol}"),
        stable_debt_token_name: format!("{} {symbol}", p.stable_debt_token_name_prefix),
        stable_debt_token_symbol: format!("stableDebt{sp}{symbol}"),
        params: Bytes::from_static(&DEFAULT_INIT_PARAMS),
    })
}

/// Build one init record per addressed reserve, in table order.
pub fn build_init_records(
    targets: &[AddressedReserve<'_>],
    ctx: &InitRecordContext<'_>,
) -> eyre::Result<Vec<(String, InitReserveRecord)>> {
    targets
        .iter()
        .map(|&(symbol, params, underlying)| {
            let record = build_init_record(symbol, params, underlying, ctx)
                .with_context(|| format!("build init record for {symbol}"))?;
            Ok((symbol.to_owned(), record))
        })
        .collect()
}

#[cfg(test)]
pub mod fixtures {
    use super::*;

    pub fn strategy(name: &str) -> StrategyParams {
        StrategyParams {
            name: name.to_owned(),
            optimal_utilization_rate: "450000000000000000000000000".into(),
            base_variable_borrow_rate: "0".into(),
            variable_rate_slope1: "70000000000000000000000000".into(),
            variable_rate_slope2: "3000000000000000000000000000".into(),
            stable_rate_slope1: "100000000000000000000000000".into(),
            stable_rate_slope2: "3000000000000000000000000000".into(),
        }
    }

    pub fn reserve(strategy_name: &str, ltv: &str) -> ReserveParams {
        ReserveParams {
            strategy: strategy(strategy_name),
            a_token_impl: ATokenImpl::AToken,
            reserve_decimals: 18,
            base_ltv_as_collateral: ltv.to_owned(),
            liquidation_threshold: "6500".into(),
            liquidation_bonus: "11000".into(),
            reserve_factor: "2000".into(),
            borrowing_enabled: true,
            stable_borrow_rate_enabled: true,
        }
    }

    /// AAVE, BAT, BUSD, DAI with addresses 0x..01 through 0x..04.
    pub fn four_assets() -> (ReserveTable, TokenAddressTable) {
        let mut reserves = ReserveTable::new();
        let mut tokens = TokenAddressTable::new();
        for (i, sym) in ["AAVE", "BAT", "BUSD", "DAI"].into_iter().enumerate() {
            let last = u8::try_from(i + 1).unwrap_or(u8::MAX);
            let strat = if sym == "BUSD" || sym == "DAI" {
                "rateStrategyStable"
            } else {
                "rateStrategyVolatile"
            };
            reserves.insert(sym.to_owned(), reserve(strat, "5000"));
            tokens.insert(sym.to_owned(), Address::with_last_byte(last));
        }
        (reserves, tokens)
    }
}
