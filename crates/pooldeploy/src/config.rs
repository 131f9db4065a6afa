use crate::chunk::ChunkSize;
use crate::errors::DeployError;
use crate::reserves::{NamePrefixes, ReserveTable, TokenAddressTable};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_NETWORK: &str = "localhost";

/// Gas ceiling for `configureReserves`; estimation is unreliable for large batches.
pub const DEFAULT_CONFIGURE_GAS_LIMIT: u64 = 12_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub fallback_rpc_urls: Vec<String>,
    pub chain_id: u64,
}

struct NetworkDef {
    name: &'static str,
    rpc_url: &'static str,
    chain_id: u64,
    fallbacks: &'static [&'static str],
}

const KNOWN_NETWORKS: &[NetworkDef] = &[
    NetworkDef {
        name: "localhost",
        rpc_url: "http://127.0.0.1:8545",
        chain_id: 31337,
        fallbacks: &[],
    },
    NetworkDef {
        name: "ethereum",
        rpc_url: "https://ethereum-rpc.publicnode.com",
        chain_id: 1,
        fallbacks: &["https://rpc.ankr.com/eth", "https://eth.llamarpc.com"],
    },
    NetworkDef {
        name: "sepolia",
        rpc_url: "https://rpc.sepolia.org",
        chain_id: 11_155_111,
        fallbacks: &[
            "https://ethereum-sepolia-rpc.publicnode.com",
            "https://rpc.ankr.com/eth_sepolia",
        ],
    },
    NetworkDef {
        name: "polygon",
        rpc_url: "https://polygon-rpc.com",
        chain_id: 137,
        fallbacks: &["https://polygon-bor-rpc.publicnode.com"],
    },
    NetworkDef {
        name: "polygon-amoy",
        rpc_url: "https://rpc-amoy.polygon.technology",
        chain_id: 80002,
        fallbacks: &["https://polygon-amoy-bor-rpc.publicnode.com"],
    },
];

fn default_networks() -> BTreeMap<String, NetworkConfig> {
    KNOWN_NETWORKS
        .iter()
        .map(|d| {
            (
                d.name.to_owned(),
                NetworkConfig {
                    rpc_url: d.rpc_url.to_owned(),
                    fallback_rpc_urls: d.fallbacks.iter().map(|s| (*s).to_owned()).collect(),
                    chain_id: d.chain_id,
                },
            )
        })
        .collect()
}

const fn default_init_chunk_size() -> ChunkSize {
    ChunkSize::RESERVE_INIT
}

const fn default_configure_chunk_size() -> ChunkSize {
    ChunkSize::RESERVE_CONFIGURE
}

const fn default_configure_gas_limit() -> u64 {
    DEFAULT_CONFIGURE_GAS_LIMIT
}

/// Per-network address, e.g. `treasury.sepolia = "0x..."`.
pub type NetworkAddresses = BTreeMap<String, Address>;

/// One lending market: its identity, the reserves it lists and the privileged accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub market_id: String,
    #[serde(default, flatten)]
    pub prefixes: NamePrefixes,

    #[serde(default)]
    pub treasury: NetworkAddresses,
    #[serde(default)]
    pub incentives_controller: NetworkAddresses,
    /// Falls back to the signer when unset.
    #[serde(default)]
    pub pool_admin: NetworkAddresses,
    #[serde(default)]
    pub emergency_admin: NetworkAddresses,
    /// An existing registry to add new providers to. A registry is deployed when absent.
    #[serde(default)]
    pub provider_registry: NetworkAddresses,
    /// A pre-deployed `LendingPool` implementation. One is deployed when absent.
    #[serde(default)]
    pub lending_pool_impl: NetworkAddresses,
    /// `AaveProtocolDataProvider`; the address book entry is used when absent.
    #[serde(default)]
    pub data_provider: NetworkAddresses,
    /// Registry id for a new provider. Defaults to one past the registered count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<u64>,

    /// Network -> token address table.
    #[serde(default)]
    pub reserve_assets: BTreeMap<String, TokenAddressTable>,
    #[serde(default)]
    pub reserves: ReserveTable,

    #[serde(default = "default_init_chunk_size")]
    pub init_chunk_size: ChunkSize,
    #[serde(default = "default_configure_chunk_size")]
    pub configure_chunk_size: ChunkSize,
    #[serde(default = "default_configure_gas_limit")]
    pub configure_gas_limit: u64,
}

impl MarketConfig {
    #[cfg(test)]
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            prefixes: NamePrefixes::default(),
            treasury: BTreeMap::new(),
            incentives_controller: BTreeMap::new(),
            pool_admin: BTreeMap::new(),
            emergency_admin: BTreeMap::new(),
            provider_registry: BTreeMap::new(),
            lending_pool_impl: BTreeMap::new(),
            data_provider: BTreeMap::new(),
            provider_id: None,
            reserve_assets: BTreeMap::new(),
            reserves: ReserveTable::new(),
            init_chunk_size: ChunkSize::RESERVE_INIT,
            configure_chunk_size: ChunkSize::RESERVE_CONFIGURE,
            configure_gas_limit: DEFAULT_CONFIGURE_GAS_LIMIT,
        }
    }

    /// Token addresses on `network`. An unknown network yields an empty table so every
    /// reserve is skipped as unaddressed.
    pub fn tokens_on(&self, network: &str) -> TokenAddressTable {
        self.reserve_assets.get(network).cloned().unwrap_or_default()
    }
}

/// Look up a per-network address, treating the zero address as unset.
pub fn on_network(table: &NetworkAddresses, network: &str) -> Option<Address> {
    table.get(network).copied().filter(|a| !a.is_zero())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Network used when `--network` is not given.
    pub network: String,
    /// Root of the compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    /// Overrides the address book location under the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_book: Option<PathBuf>,
    /// How long to wait for a receipt before giving up on a transaction.
    pub receipt_timeout_seconds: u64,
    pub networks: BTreeMap<String, NetworkConfig>,
    pub markets: BTreeMap<String, MarketConfig>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_owned(),
            artifacts_dir: PathBuf::from("artifacts"),
            address_book: None,
            receipt_timeout_seconds: 600,
            networks: default_networks(),
            markets: BTreeMap::new(),
        }
    }
}

impl DeployConfig {
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, DeployError> {
        self.networks
            .get(name)
            .ok_or_else(|| DeployError::UnknownNetwork(name.to_owned()))
    }

    pub fn market(&self, name: &str) -> Result<&MarketConfig, DeployError> {
        self.markets
            .get(name)
            .ok_or_else(|| DeployError::UnknownMarket(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reserves::ATokenImpl;

    const MARKET_TOML: &str = r#"
network = "sepolia"
artifacts_dir = "/opt/protocol/artifacts"

[markets.Aave]
market_id = "Aave genesis market"
symbol_prefix = ""

[markets.Aave.pool_admin]
sepolia = "0x00000000000000000000000000000000000000aa"

[markets.Aave.reserve_assets.sepolia]
DAI = "0x0000000000000000000000000000000000000004"

[markets.Aave.reserves.DAI]
reserve_decimals = 18
base_ltv_as_collateral = "7500"
liquidation_threshold = "8000"
liquidation_bonus = "10500"
reserve_factor = "1000"
borrowing_enabled = true
stable_borrow_rate_enabled = true

[markets.Aave.reserves.DAI.strategy]
name = "rateStrategyStableTwo"
optimal_utilization_rate = "800000000000000000000000000"
base_variable_borrow_rate = "0"
variable_rate_slope1 = "40000000000000000000000000"
variable_rate_slope2 = "750000000000000000000000000"
stable_rate_slope1 = "20000000000000000000000000"
stable_rate_slope2 = "750000000000000000000000000"

[markets.Amm]
market_id = "Aave AMM market"
symbol_prefix = "Amm"
a_token_name_prefix = "Aave AMM Market"
init_chunk_size = 5
"#;

    #[test]
    fn market_toml_parses_with_defaults() -> eyre::Result<()> {
        let cfg: DeployConfig = toml::from_str(MARKET_TOML)?;
        assert_eq!(cfg.network, "sepolia");
        assert_eq!(cfg.receipt_timeout_seconds, 600);
        assert!(cfg.networks.contains_key("localhost"), "built-in networks");

        let aave = cfg.market("Aave")?;
        assert_eq!(aave.init_chunk_size, ChunkSize::RESERVE_INIT);
        assert_eq!(aave.configure_chunk_size, ChunkSize::RESERVE_CONFIGURE);
        assert_eq!(aave.configure_gas_limit, 12_000_000);
        assert_eq!(aave.prefixes.a_token_name_prefix, "Aave interest bearing");
        assert_eq!(
            on_network(&aave.pool_admin, "sepolia"),
            Some(Address::with_last_byte(0xaa))
        );
        assert_eq!(on_network(&aave.pool_admin, "ethereum"), None);

        let dai = aave
            .reserves
            .get("DAI")
            .ok_or_else(|| eyre::eyre!("DAI missing"))?;
        assert_eq!(dai.a_token_impl, ATokenImpl::AToken);
        assert_eq!(dai.strategy.name, "rateStrategyStableTwo");
        assert_eq!(aave.tokens_on("sepolia").len(), 1);
        assert!(aave.tokens_on("polygon").is_empty());

        let amm = cfg.market("Amm")?;
        assert_eq!(amm.prefixes.symbol_prefix, "Amm");
        assert_eq!(amm.prefixes.a_token_name_prefix, "Aave AMM Market");
        assert_eq!(
            amm.prefixes.variable_debt_token_name_prefix,
            "Aave variable debt bearing"
        );
        assert_eq!(amm.init_chunk_size.get(), 5);
        Ok(())
    }

    #[test]
    fn zero_chunk_size_is_rejected_at_parse() {
        let s = "[markets.X]\nmarket_id = \"x\"\nconfigure_chunk_size = 0\n";
        assert!(toml::from_str::<DeployConfig>(s).is_err());
    }

    #[test]
    fn unknown_market_and_network_are_typed_errors() {
        let cfg = DeployConfig::default();
        assert_eq!(
            cfg.market("Nope").err(),
            Some(DeployError::UnknownMarket("Nope".into()))
        );
        assert_eq!(
            cfg.network("mars").err(),
            Some(DeployError::UnknownNetwork("mars".into()))
        );
    }

    #[test]
    fn default_config_round_trips_through_toml() -> eyre::Result<()> {
        let mut cfg = DeployConfig::default();
        cfg.markets.insert("Aave".into(), MarketConfig::new("Aave genesis market"));
        let s = toml::to_string_pretty(&cfg)?;
        let back: DeployConfig = toml::from_str(&s)?;
        assert_eq!(back, cfg);
        Ok(())
    }
}
