//! Offline dry run: what `init-reserves` and `configure-reserves` would send, computed from
//! config and the address book alone.

use crate::address_book::AddressBook;
use crate::chunk::{chunks, ChunkSize};
use crate::config::MarketConfig;
use crate::contracts::names;
use crate::reserves::{addressed_reserves, ATokenImpl, SkipReason, Skipped};
use alloy::primitives::Address;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub chunk_size: usize,
    /// Symbols per transaction, in submission order.
    pub transactions: Vec<Vec<String>>,
    pub skipped: Vec<Skipped>,
}

impl BatchPlan {
    fn new(symbols: &[String], size: ChunkSize, skipped: Vec<Skipped>) -> Self {
        Self {
            chunk_size: size.get(),
            transactions: chunks(symbols, size).map(<[String]>::to_vec).collect(),
            skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub network: String,
    /// Contract key -> recorded address, or `None` when the run would deploy it.
    pub deployments: BTreeMap<String, Option<Address>>,
    pub init: BatchPlan,
    /// Already-enabled collateral can only be detected on chain, so it is not excluded here.
    pub configure: BatchPlan,
}

pub fn build(market: &MarketConfig, network: &str, book: &AddressBook) -> Plan {
    let tokens = market.tokens_on(network);

    let mut init_skipped = Vec::new();
    let addressed = addressed_reserves(&market.reserves, &tokens, &mut init_skipped);

    let mut deployments = BTreeMap::new();
    let mut impl_keys = vec![
        names::ATOKEN_IMPL_KEY,
        names::STABLE_DEBT_TOKEN_IMPL_KEY,
        names::VARIABLE_DEBT_TOKEN_IMPL_KEY,
    ];
    if addressed
        .iter()
        .any(|(_, p, _)| p.a_token_impl == ATokenImpl::DelegationAwareAToken)
    {
        impl_keys.push(names::DELEGATION_AWARE_ATOKEN_IMPL_KEY);
    }
    for key in impl_keys {
        deployments.insert(key.to_owned(), book.get(key, network));
    }
    for (_, p, _) in &addressed {
        deployments
            .entry(p.strategy.name.clone())
            .or_insert_with(|| book.get(&p.strategy.name, network));
    }

    let init_symbols: Vec<String> = addressed.iter().map(|(s, _, _)| (*s).to_owned()).collect();

    let mut configure_skipped = init_skipped.clone();
    let configure_symbols: Vec<String> = addressed
        .iter()
        .filter(|(symbol, p, _)| {
            let keep = p.usable_as_collateral();
            if !keep {
                configure_skipped.push(Skipped {
                    symbol: (*symbol).to_owned(),
                    reason: SkipReason::NotCollateral,
                });
            }
            keep
        })
        .map(|(s, _, _)| (*s).to_owned())
        .collect();

    Plan {
        network: network.to_owned(),
        deployments,
        init: BatchPlan::new(&init_symbols, market.init_chunk_size, init_skipped),
        configure: BatchPlan::new(
            &configure_symbols,
            market.configure_chunk_size,
            configure_skipped,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reserves::fixtures::four_assets;

    #[test]
    fn plan_matches_what_the_runs_would_send() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut book = AddressBook::open(&dir.path().join("book.json"))?;
        book.insert(names::ATOKEN_IMPL_KEY, "localhost", Address::with_last_byte(0xa1), None)?;

        let (reserves, tokens) = four_assets();
        let mut market = MarketConfig::new("m");
        market.reserves = reserves;
        market.reserve_assets.insert("localhost".into(), tokens);
        if let Some(bat) = market.reserves.get_mut("BAT") {
            bat.base_ltv_as_collateral = "-1".into();
        }

        let plan = build(&market, "localhost", &book);

        assert_eq!(
            plan.init.transactions,
            vec![
                vec!["AAVE".to_owned(), "BAT".into(), "BUSD".into()],
                vec!["DAI".to_owned()]
            ]
        );
        assert_eq!(
            plan.configure.transactions,
            vec![vec!["AAVE".to_owned(), "BUSD".into(), "DAI".into()]]
        );
        assert_eq!(
            plan.deployments.get(names::ATOKEN_IMPL_KEY),
            Some(&Some(Address::with_last_byte(0xa1)))
        );
        assert_eq!(plan.deployments.get("rateStrategyStable"), Some(&None));
        assert!(!plan
            .deployments
            .contains_key(names::DELEGATION_AWARE_ATOKEN_IMPL_KEY));
        Ok(())
    }

    #[test]
    fn unknown_network_skips_everything() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let book = AddressBook::open(&dir.path().join("book.json"))?;
        let (reserves, _) = four_assets();
        let mut market = MarketConfig::new("m");
        market.reserves = reserves;

        let plan = build(&market, "polygon", &book);
        assert!(plan.init.transactions.is_empty(), "no chunks for no records");
        assert_eq!(plan.init.skipped.len(), 4);
        Ok(())
    }
}
