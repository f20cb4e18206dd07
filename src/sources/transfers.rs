//! On-chain transfer adapter: trailing-24h token transfers, classified and
//! grouped into the top-3 sells / buys / plain transfers by USD value.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::{classify, AddressRegistry, TradeType};
use crate::fetch::FetchClient;
use crate::sources::SourceSpec;

const TRANSFERS_URL: &str = "https://api.nansen.ai/api/beta/api/v1/tgm/transfers";
const QUERY_LIMIT: usize = 25;
const TOP_N: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from_address: String,
    pub from_label: Option<String>,
    pub to_address: String,
    pub to_label: Option<String>,
    pub amount: f64,
    pub value_usd: f64,
    pub tx_hash: String,
    pub timestamp: Option<String>,
    pub trade_type: TradeType,
}

/// Per-token movement summary, fully rebuilt on each transfer poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenFlows {
    pub sells: Vec<TransferRecord>,
    pub buys: Vec<TransferRecord>,
    pub transfers: Vec<TransferRecord>,
    pub updated: Option<DateTime<Utc>>,
}

impl TokenFlows {
    /// Largest movement in each class, for the live feed.
    pub fn top_of(&self, kind: TradeType) -> Option<&TransferRecord> {
        match kind {
            TradeType::Sell => self.sells.first(),
            TradeType::Buy => self.buys.first(),
            TradeType::Transfer => self.transfers.first(),
        }
    }
}

// Wire row; the endpoint sometimes nests rows under `data`.
#[derive(Debug, Deserialize)]
struct RawTransfer {
    from_address: String,
    #[serde(default)]
    from_address_label: Option<String>,
    to_address: String,
    #[serde(default)]
    to_address_label: Option<String>,
    #[serde(default)]
    transfer_amount: f64,
    #[serde(default)]
    transfer_value_usd: f64,
    #[serde(default)]
    transaction_hash: String,
    #[serde(default)]
    block_timestamp: Option<String>,
}

pub struct TransferAdapter<'a> {
    fetch: &'a FetchClient,
    api_key: &'a str,
}

impl<'a> TransferAdapter<'a> {
    pub fn new(fetch: &'a FetchClient, api_key: &'a str) -> Self {
        Self { fetch, api_key }
    }

    /// Query the trailing-24h transfer ledger for one token and fold it into
    /// classified top-3 groups.
    pub async fn fetch_token(
        &self,
        spec: &SourceSpec,
        registry: &AddressRegistry,
        now: DateTime<Utc>,
    ) -> Result<TokenFlows> {
        let address = spec.address.context("source has no token address")?;
        let to = now.format("%Y-%m-%d").to_string();
        let from = (now - Duration::hours(24)).format("%Y-%m-%d").to_string();
        let body = serde_json::json!({
            "token_address": address,
            "chain": spec.chain,
            "date": { "from": from, "to": to },
            "pagination": { "limit": QUERY_LIMIT }
        });
        let resp = self
            .fetch
            .post_json(TRANSFERS_URL, &body, &[("apiKey", self.api_key)])
            .await
            .with_context(|| format!("{} transfer query", spec.id))?;

        Ok(flows_from_payload(&resp, registry, now))
    }
}

/// Classify raw rows and keep the top movements per class. Pure over the
/// payload so fixtures can drive it.
pub fn flows_from_payload(
    payload: &Value,
    registry: &AddressRegistry,
    now: DateTime<Utc>,
) -> TokenFlows {
    // rows live under `data`, or the payload is the array itself
    let rows = payload
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| payload.as_array())
        .cloned()
        .unwrap_or_default();

    let mut records: Vec<TransferRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        let raw: RawTransfer = match serde_json::from_value(row) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed transfer row");
                continue;
            }
        };
        let trade_type = classify(&raw.from_address, &raw.to_address, registry);
        records.push(TransferRecord {
            from_address: raw.from_address,
            from_label: raw.from_address_label,
            to_address: raw.to_address,
            to_label: raw.to_address_label,
            amount: raw.transfer_amount,
            value_usd: raw.transfer_value_usd,
            tx_hash: raw.transaction_hash,
            timestamp: raw.block_timestamp,
            trade_type,
        });
    }

    group_top(records, now)
}

fn group_top(mut records: Vec<TransferRecord>, now: DateTime<Utc>) -> TokenFlows {
    records.sort_by(|a, b| {
        b.value_usd
            .partial_cmp(&a.value_usd)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut flows = TokenFlows {
        updated: Some(now),
        ..Default::default()
    };
    for rec in records {
        let bucket = match rec.trade_type {
            TradeType::Sell => &mut flows.sells,
            TradeType::Buy => &mut flows.buys,
            TradeType::Transfer => &mut flows.transfers,
        };
        if bucket.len() < TOP_N {
            bucket.push(rec);
        }
    }
    flows
}
