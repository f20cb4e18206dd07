//! Collateral-position adapter: one tracked borrow position on a
//! Liquity-style market, refreshed from its subgraph.
//!
//! Redemptions repay debt starting from the lowest interest rate, so the
//! quantity that matters is "debt in front": the total debt sitting at a
//! lower rate than ours. When the tracked position is missing from subgraph
//! results (lag, reorg, pruning), the adapter degrades to the last-known-good
//! values instead of reporting an error state.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fetch::FetchClient;

/// Debt-in-front levels for the redemption note, USD.
const RISK_HIGH_BELOW: f64 = 1_000_000.0;
const RISK_ELEVATED_BELOW: f64 = 10_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralPosition {
    pub debt_in_front: f64,
    /// Annual interest rate as a fraction (0.055 = 5.5%).
    pub interest_rate: f64,
    /// Collateral value over debt, when a collateral price was available.
    pub collateral_ratio: Option<f64>,
    pub redemption_analysis: String,
    pub updated_at: DateTime<Utc>,
    /// True when this record was served from cache after a miss.
    #[serde(default)]
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct TroveRow {
    id: String,
    debt: f64,
    interest_rate: f64,
    collateral: f64,
}

pub struct CollateralAdapter<'a> {
    fetch: &'a FetchClient,
    subgraph_url: &'a str,
    tracked_id: &'a str,
}

impl<'a> CollateralAdapter<'a> {
    pub fn new(fetch: &'a FetchClient, subgraph_url: &'a str, tracked_id: &'a str) -> Self {
        Self {
            fetch,
            subgraph_url,
            tracked_id,
        }
    }

    /// Refresh the tracked position. `collateral_usd` is the collateral
    /// asset's USD price, when the price poll produced one this cycle.
    pub async fn fetch_position(
        &self,
        collateral_usd: Option<f64>,
        cached: Option<&CollateralPosition>,
        now: DateTime<Utc>,
    ) -> Result<CollateralPosition> {
        let query = r#"{ troves(first: 1000, where: {status: "active"}, orderBy: "annualInterestRate", orderDirection: asc) { id debt annualInterestRate collateral } }"#;
        let body = serde_json::json!({ "query": query });
        let resp = self
            .fetch
            .post_json(self.subgraph_url, &body, &[])
            .await
            .context("collateral subgraph query")?;

        let rows = trove_rows(&resp);
        match position_from_rows(&rows, self.tracked_id, collateral_usd, now) {
            Ok(pos) => Ok(pos),
            Err(e) => match cached {
                // tracked id missing from results: keep last-known-good
                Some(prev) => {
                    tracing::warn!(error = %e, "tracked position missing, serving cached values");
                    Ok(CollateralPosition {
                        stale: true,
                        ..prev.clone()
                    })
                }
                None => Err(e),
            },
        }
    }
}

fn trove_rows(payload: &Value) -> Vec<TroveRow> {
    let rows = payload
        .pointer("/data/troves")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    rows.iter()
        .filter_map(|r| {
            Some(TroveRow {
                id: r.get("id")?.as_str()?.to_string(),
                debt: num_field(r.get("debt")?),
                interest_rate: num_field(r.get("annualInterestRate")?),
                collateral: num_field(r.get("collateral")?),
            })
        })
        .collect()
}

// subgraphs ship numerics as strings as often as not
fn num_field(v: &Value) -> f64 {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0.0)
}

/// Pure aggregation over the rate-ordered trove list.
fn position_from_rows(
    rows: &[TroveRow],
    tracked_id: &str,
    collateral_usd: Option<f64>,
    now: DateTime<Utc>,
) -> Result<CollateralPosition> {
    let tracked = rows
        .iter()
        .find(|r| r.id.eq_ignore_ascii_case(tracked_id));
    let Some(tracked) = tracked else {
        bail!("tracked position {tracked_id} absent from subgraph results");
    };

    let debt_in_front: f64 = rows
        .iter()
        .filter(|r| r.interest_rate < tracked.interest_rate)
        .map(|r| r.debt)
        .sum();

    let collateral_ratio = collateral_usd.and_then(|price| {
        if tracked.debt > 0.0 {
            Some(tracked.collateral * price / tracked.debt)
        } else {
            None
        }
    });

    Ok(CollateralPosition {
        debt_in_front,
        interest_rate: tracked.interest_rate,
        collateral_ratio,
        redemption_analysis: redemption_note(debt_in_front),
        updated_at: now,
        stale: false,
    })
}

fn redemption_note(debt_in_front: f64) -> String {
    let m = debt_in_front / 1_000_000.0;
    if debt_in_front < RISK_HIGH_BELOW {
        format!("HIGH redemption risk: only ${m:.2}M of debt redeems first")
    } else if debt_in_front < RISK_ELEVATED_BELOW {
        format!("Elevated redemption risk: ${m:.1}M of debt redeems first")
    } else {
        format!("Low redemption risk: ${m:.1}M of debt redeems first")
    }
}

/// Alert when risk worsened tier-to-tier between consecutive refreshes.
pub fn risk_increased(prev: &CollateralPosition, next: &CollateralPosition) -> bool {
    fn tier(p: &CollateralPosition) -> u8 {
        if p.debt_in_front < RISK_HIGH_BELOW {
            2
        } else if p.debt_in_front < RISK_ELEVATED_BELOW {
            1
        } else {
            0
        }
    }
    tier(next) > tier(prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<TroveRow> {
        vec![
            TroveRow {
                id: "0xlow".into(),
                debt: 600_000.0,
                interest_rate: 0.035,
                collateral: 100.0,
            },
            TroveRow {
                id: "0xmine".into(),
                debt: 250_000.0,
                interest_rate: 0.050,
                collateral: 120.0,
            },
            TroveRow {
                id: "0xhigh".into(),
                debt: 9_000_000.0,
                interest_rate: 0.080,
                collateral: 4000.0,
            },
        ]
    }

    #[test]
    fn debt_in_front_sums_lower_rates_only() {
        let pos = position_from_rows(&rows(), "0xmine", None, Utc::now()).unwrap();
        assert_eq!(pos.debt_in_front, 600_000.0);
        assert_eq!(pos.interest_rate, 0.050);
        assert!(pos.collateral_ratio.is_none());
        assert!(pos.redemption_analysis.contains("HIGH"));
        assert!(!pos.stale);
    }

    #[test]
    fn collateral_ratio_uses_price() {
        let pos = position_from_rows(&rows(), "0xmine", Some(5000.0), Utc::now()).unwrap();
        // 120 collateral * 5000 / 250k debt
        assert_eq!(pos.collateral_ratio, Some(2.4));
    }

    #[test]
    fn missing_tracked_id_is_an_error() {
        assert!(position_from_rows(&rows(), "0xnope", None, Utc::now()).is_err());
    }

    #[test]
    fn stringly_numerics_parse() {
        let payload = serde_json::json!({ "data": { "troves": [
            {"id": "0xa", "debt": "123.5", "annualInterestRate": "0.04", "collateral": "7"}
        ]}});
        let rows = trove_rows(&payload);
        assert_eq!(rows[0].debt, 123.5);
        assert_eq!(rows[0].interest_rate, 0.04);
    }

    #[test]
    fn risk_transition_detection() {
        let now = Utc::now();
        let mk = |dif: f64| CollateralPosition {
            debt_in_front: dif,
            interest_rate: 0.05,
            collateral_ratio: None,
            redemption_analysis: redemption_note(dif),
            updated_at: now,
            stale: false,
        };
        assert!(risk_increased(&mk(20_000_000.0), &mk(5_000_000.0)));
        assert!(risk_increased(&mk(5_000_000.0), &mk(500_000.0)));
        assert!(!risk_increased(&mk(5_000_000.0), &mk(6_000_000.0)));
        assert!(!risk_increased(&mk(500_000.0), &mk(20_000_000.0)));
    }
}
