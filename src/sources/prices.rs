//! Batched price quotes for the whole watchlist in one CoinGecko call.
//!
//! A partial response never corrupts the snapshot: only the assets present
//! in the body are written, and the snapshot as a whole is replaced — never
//! merged — on each successful poll.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::fetch::{FetchClient, FetchPolicy};
use crate::sources::SourceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceQuote {
    pub usd: Option<f64>,
    pub usd_24h_change: Option<f64>,
    pub usd_market_cap: Option<f64>,
    /// Token price denominated in ETH, when the endpoint returns it.
    pub eth: Option<f64>,
}

impl PriceQuote {
    /// ETH/USD implied by this quote, when both legs are present.
    pub fn implied_eth_usd(&self) -> Option<f64> {
        match (self.usd, self.eth) {
            (Some(usd), Some(eth)) if eth > 0.0 => Some(usd / eth),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub data: BTreeMap<String, PriceQuote>,
}

pub struct PriceAdapter<'a> {
    fetch: &'a FetchClient,
}

impl<'a> PriceAdapter<'a> {
    pub fn new(fetch: &'a FetchClient) -> Self {
        Self { fetch }
    }

    pub async fn fetch_snapshot(
        &self,
        watchlist: &[SourceSpec],
        now: DateTime<Utc>,
    ) -> Result<PriceSnapshot> {
        let ids: Vec<&str> = watchlist.iter().map(|s| s.token).collect();
        let url = format!(
            "https://api.coingecko.com/api/v3/simple/price?ids={}&vs_currencies=usd,eth&include_24hr_change=true&include_market_cap=true",
            ids.join(",")
        );
        let payload = self
            .fetch
            .get_json(&url, FetchPolicy::direct())
            .await
            .context("price quote fetch")?;
        Ok(snapshot_from_payload(&payload, now))
    }
}

/// Only assets present in the body make it into the snapshot; malformed
/// per-asset entries are skipped, not fatal.
pub fn snapshot_from_payload(payload: &Value, now: DateTime<Utc>) -> PriceSnapshot {
    let mut data = BTreeMap::new();
    if let Some(map) = payload.as_object() {
        for (token, quote) in map {
            if let Ok(q) = serde_json::from_value::<PriceQuote>(quote.clone()) {
                data.insert(token.clone(), q);
            }
        }
    }
    PriceSnapshot {
        timestamp: now,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_payload_writes_present_assets_only() {
        let payload: Value = serde_json::from_str(
            r#"{
                "gnosis": {"usd": 180.5, "usd_24h_change": -2.1, "usd_market_cap": 4.7e8},
                "cow-protocol": {"usd": 0.31, "eth": 0.000093}
            }"#,
        )
        .unwrap();
        let snap = snapshot_from_payload(&payload, Utc::now());
        assert_eq!(snap.data.len(), 2);
        assert_eq!(snap.data["gnosis"].usd, Some(180.5));
        assert!(snap.data["gnosis"].eth.is_none());
        assert!(snap.data["cow-protocol"].usd_24h_change.is_none());
        assert!(!snap.data.contains_key("safe"));
    }

    #[test]
    fn implied_eth_usd_needs_both_legs() {
        let q = PriceQuote {
            usd: Some(100.0),
            eth: Some(0.025),
            ..Default::default()
        };
        assert_eq!(q.implied_eth_usd(), Some(4000.0));
        assert_eq!(PriceQuote::default().implied_eth_usd(), None);
    }

    #[test]
    fn non_object_payload_yields_empty_snapshot() {
        let snap = snapshot_from_payload(&Value::Null, Utc::now());
        assert!(snap.data.is_empty());
    }
}
