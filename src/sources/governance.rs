//! Snapshot governance adapter: active proposals per space, wholesale
//! refresh, no historical retention beyond the current snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fetch::FetchClient;

const HUB_URL: &str = "https://hub.snapshot.org/graphql";
const PROPOSAL_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub state: String,
    /// Voting close, unix seconds.
    pub end: i64,
    pub choices: Vec<String>,
    pub scores: Vec<f64>,
    pub scores_total: f64,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GovernanceSnapshot {
    pub proposals: Vec<Proposal>,
    pub updated: Option<DateTime<Utc>>,
}

pub struct GovernanceAdapter<'a> {
    fetch: &'a FetchClient,
}

impl<'a> GovernanceAdapter<'a> {
    pub fn new(fetch: &'a FetchClient) -> Self {
        Self { fetch }
    }

    /// Active proposals for one space, soonest-closing first, capped at 5.
    pub async fn fetch_space(
        &self,
        space: &str,
        now: DateTime<Utc>,
    ) -> Result<GovernanceSnapshot> {
        let query = format!(
            r#"{{ proposals(first: {PROPOSAL_LIMIT}, where: {{space: "{space}", state: "active"}}, orderBy: "end", orderDirection: asc) {{ id title state end choices scores scores_total link }} }}"#
        );
        let body = serde_json::json!({ "query": query });
        let resp = self
            .fetch
            .post_json(HUB_URL, &body, &[])
            .await
            .with_context(|| format!("snapshot query for {space}"))?;
        Ok(GovernanceSnapshot {
            proposals: proposals_from_payload(&resp, space),
            updated: Some(now),
        })
    }
}

/// Pure payload mapping; rows missing an id are dropped, a missing link gets
/// the canonical Snapshot URL.
pub fn proposals_from_payload(payload: &Value, space: &str) -> Vec<Proposal> {
    let rows = payload
        .pointer("/data/proposals")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            continue;
        }
        let link = row
            .get("link")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://snapshot.org/#/{space}/proposal/{id}"));
        out.push(Proposal {
            title: row
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("(untitled)")
                .to_string(),
            state: row
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("active")
                .to_string(),
            end: row.get("end").and_then(Value::as_i64).unwrap_or(0),
            choices: row
                .get("choices")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            scores: row
                .get("scores")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_f64).collect())
                .unwrap_or_default(),
            scores_total: row
                .get("scores_total")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            link,
            id,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_maps_with_link_default() {
        let payload = serde_json::json!({ "data": { "proposals": [
            {
                "id": "0xp1", "title": "Fund the grants round", "state": "active",
                "end": 1766000000, "choices": ["For", "Against"],
                "scores": [1200.5, 300.0], "scores_total": 1500.5
            },
            { "id": "0xp2", "title": "Treasury move", "state": "active", "end": 1767000000,
              "choices": [], "scores": [], "scores_total": 0.0,
              "link": "https://custom.example/p2" },
            { "title": "no id, dropped" }
        ]}});
        let props = proposals_from_payload(&payload, "gnosis.eth");
        assert_eq!(props.len(), 2);
        assert_eq!(
            props[0].link,
            "https://snapshot.org/#/gnosis.eth/proposal/0xp1"
        );
        assert_eq!(props[1].link, "https://custom.example/p2");
        assert_eq!(props[0].scores_total, 1500.5);
    }

    #[test]
    fn empty_or_malformed_payload_yields_no_proposals() {
        assert!(proposals_from_payload(&serde_json::json!({}), "x.eth").is_empty());
        assert!(proposals_from_payload(&serde_json::json!({"data": {}}), "x.eth").is_empty());
    }
}
