//! Heuristic buy/sell/transfer labeling of token movements.
//!
//! Two known-address sets drive the classification: DEX router contracts and
//! custodial exchange hot wallets. This is best-effort labeling, not
//! financial-grade attribution — a whale move between two unknown wallets is
//! simply a `transfer`, never an error. The compiled-in sets will drift as
//! exchanges rotate wallets; override them with a TOML file when they do.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Buy,
    Sell,
    Transfer,
}

impl TradeType {
    pub fn icon(&self) -> &'static str {
        match self {
            TradeType::Buy => "\u{1F7E2}",
            TradeType::Sell => "\u{1F534}",
            TradeType::Transfer => "\u{2194}\u{FE0F}",
        }
    }
}

/// Known on-chain actors, lowercased hex addresses.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressRegistry {
    #[serde(deserialize_with = "lowered")]
    routers: HashSet<String>,
    #[serde(deserialize_with = "lowered")]
    exchanges: HashSet<String>,
}

fn lowered<'de, D>(de: D) -> std::result::Result<HashSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<String> = serde::Deserialize::deserialize(de)?;
    Ok(raw.into_iter().map(|a| a.to_lowercase()).collect())
}

impl Default for AddressRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AddressRegistry {
    /// Compiled-in defaults: the routers that carry most GNO/COW/SAFE volume
    /// plus the usual custodial hot wallets.
    pub fn builtin() -> Self {
        let routers = [
            // Uniswap v2 / v3 / universal router
            "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
            "0xe592427a0aece92de3edee1f18e0157c05861564",
            "0x3fc91a3afd70395cd496c647d5a6cc9d4b2b7fad",
            // 1inch aggregation router v5
            "0x1111111254eeb25477b68fb85ed929f73a960582",
            // CoW Protocol settlement
            "0x9008d19f58aabd9ed0d60971565aa8510560ab41",
            // 0x exchange proxy
            "0xdef1c0ded9bec7f1a1670819833240f027b25eff",
        ];
        let exchanges = [
            // Binance 14 / 16
            "0x28c6c06298d514db089934071355e5743bf21d60",
            "0xdfd5293d8e347dfe59e90efd55b2956a1343963d",
            // Coinbase 10
            "0x71660c4005ba85c37ccec55d0c4493e66fe775d3",
            // Kraken 4
            "0x2910543af39aba0cd09dbb2d50200b3e800a63d2",
            // OKX
            "0x6cc5f688a315f3dc28a7781717a9a798a59fda7b",
            // Bitfinex 2
            "0x742d35cc6634c0532925a3b844bc454e4438f44e",
        ];
        Self {
            routers: routers.iter().map(|a| a.to_string()).collect(),
            exchanges: exchanges.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Load the registry from a TOML file with `routers = [...]` and
    /// `exchanges = [...]` arrays.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading address registry {}", path.display()))?;
        toml::from_str(&raw).context("parsing address registry toml")
    }

    /// File override if present and valid, otherwise the builtin sets.
    pub fn load_or_builtin(path: Option<&Path>) -> Self {
        match path {
            Some(p) => match Self::from_toml_file(p) {
                Ok(reg) => reg,
                Err(e) => {
                    tracing::warn!(error = ?e, "address registry load failed, using builtin sets");
                    Self::builtin()
                }
            },
            None => Self::builtin(),
        }
    }

    pub fn is_router(&self, addr: &str) -> bool {
        self.routers.contains(&addr.to_lowercase())
    }

    pub fn is_exchange(&self, addr: &str) -> bool {
        self.exchanges.contains(&addr.to_lowercase())
    }
}

/// Label one transfer. Router matches win over exchange matches; funds
/// leaving a router were just bought, funds entering one are being sold.
/// Exchange wallets follow the deposit-to-sell / withdraw-after-buy pattern.
pub fn classify(from: &str, to: &str, registry: &AddressRegistry) -> TradeType {
    if registry.is_router(from) {
        return TradeType::Buy;
    }
    if registry.is_router(to) {
        return TradeType::Sell;
    }
    if registry.is_exchange(to) {
        return TradeType::Sell;
    }
    if registry.is_exchange(from) {
        return TradeType::Buy;
    }
    TradeType::Transfer
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
    const EXCHANGE: &str = "0x28C6c06298d514Db089934071355E5743bf21d60";
    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    #[test]
    fn from_router_is_buy() {
        let reg = AddressRegistry::builtin();
        assert_eq!(classify(ROUTER, WALLET, &reg), TradeType::Buy);
    }

    #[test]
    fn to_router_is_sell() {
        let reg = AddressRegistry::builtin();
        assert_eq!(classify(WALLET, ROUTER, &reg), TradeType::Sell);
    }

    #[test]
    fn deposit_to_exchange_is_sell() {
        let reg = AddressRegistry::builtin();
        assert_eq!(classify(WALLET, EXCHANGE, &reg), TradeType::Sell);
    }

    #[test]
    fn withdrawal_from_exchange_is_buy() {
        let reg = AddressRegistry::builtin();
        assert_eq!(classify(EXCHANGE, WALLET, &reg), TradeType::Buy);
    }

    #[test]
    fn router_wins_over_exchange() {
        // router -> exchange would be `sell` by the exchange rule, but the
        // router rule is checked first
        let reg = AddressRegistry::builtin();
        assert_eq!(classify(ROUTER, EXCHANGE, &reg), TradeType::Buy);
    }

    #[test]
    fn unknown_pair_is_transfer() {
        let reg = AddressRegistry::builtin();
        let other = "0x00000000000000000000000000000000000000bb";
        assert_eq!(classify(WALLET, other, &reg), TradeType::Transfer);
    }

    #[test]
    fn matching_ignores_case() {
        let reg = AddressRegistry::builtin();
        assert!(reg.is_router(&ROUTER.to_uppercase().replace("0X", "0x")));
    }

    #[test]
    fn toml_override_parses() {
        let reg: AddressRegistry = toml::from_str(
            r#"
            routers = ["0xAAAA000000000000000000000000000000000001"]
            exchanges = ["0xBBBB000000000000000000000000000000000002"]
            "#,
        )
        .unwrap();
        assert!(reg.is_router("0xaaaa000000000000000000000000000000000001"));
        assert_eq!(
            classify(
                "0xcccc000000000000000000000000000000000003",
                "0xbbbb000000000000000000000000000000000002",
                &reg
            ),
            TradeType::Sell
        );
    }
}
