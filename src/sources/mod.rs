//! Source adapters, one per external domain, plus the static watchlist they
//! all share. Every adapter is idempotent over its input payload: re-running
//! it on identical input reproduces identical output.

pub mod collateral;
pub mod commentary;
pub mod forum;
pub mod governance;
pub mod prices;
pub mod summary;
pub mod transfers;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::fetch::FetchClient;

/// One tracked project: forum, token, governance space. `api_url == None`
/// means the project has no Discourse forum (price/transfer tracking only).
#[derive(Debug, Clone, Copy)]
pub struct SourceSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
    pub api_url: Option<&'static str>,
    /// CoinGecko asset id.
    pub token: &'static str,
    pub symbol: &'static str,
    pub icon: &'static str,
    /// ERC-20 contract for the transfer query.
    pub address: Option<&'static str>,
    pub chain: &'static str,
    /// Snapshot space for governance polling, when the project uses one.
    pub space: Option<&'static str>,
    /// This source tolerates CORS proxying of its forum API.
    pub proxy_ok: bool,
    /// Explicit structural substitute: when the forum fetch fails, synthesize
    /// topics from this governance space instead. Per-source, not generic.
    pub forum_fallback_space: Option<&'static str>,
}

pub const WATCHLIST: &[SourceSpec] = &[
    SourceSpec {
        id: "gnosis",
        name: "Gnosis",
        url: "https://forum.gnosis.io",
        api_url: Some("https://forum.gnosis.io/latest.json"),
        token: "gnosis",
        symbol: "GNO",
        icon: "\u{1F989}",
        address: Some("0x6810e776880c02933d47db1b9fc05908e5386b96"),
        chain: "ethereum",
        space: Some("gnosis.eth"),
        proxy_ok: true,
        forum_fallback_space: None,
    },
    SourceSpec {
        id: "cow",
        name: "CoW Protocol",
        url: "https://forum.cow.fi",
        api_url: Some("https://forum.cow.fi/latest.json"),
        token: "cow-protocol",
        symbol: "COW",
        icon: "\u{1F42E}",
        address: Some("0xdef1ca1fb7fbcdc777520aa7f396b4e015f497ab"),
        chain: "ethereum",
        space: Some("cow.eth"),
        proxy_ok: true,
        forum_fallback_space: None,
    },
    SourceSpec {
        id: "safe",
        name: "Safe",
        url: "https://forum.safe.global",
        api_url: Some("https://forum.safe.global/latest.json"),
        token: "safe",
        symbol: "SAFE",
        icon: "\u{1F510}",
        address: Some("0x5afe3855358e112b5647b952709e6165e1c1eeee"),
        chain: "ethereum",
        space: Some("safe.eth"),
        proxy_ok: true,
        // forum.safe.global rejects datacenter traffic; proposals stand in
        forum_fallback_space: Some("safe.eth"),
    },
    SourceSpec {
        id: "stakewise",
        name: "StakeWise",
        url: "https://forum.stakewise.io",
        api_url: Some("https://forum.stakewise.io/latest.json"),
        token: "stakewise",
        symbol: "SWISE",
        icon: "\u{1F969}",
        address: Some("0x48c3399719b582dd63eb5aadf12a40b4c3f52fa2"),
        chain: "ethereum",
        space: Some("stakewise.eth"),
        proxy_ok: true,
        forum_fallback_space: None,
    },
    SourceSpec {
        id: "wnxm",
        name: "Nexus Mutual",
        url: "https://forum.nexusmutual.io",
        api_url: Some("https://forum.nexusmutual.io/latest.json"),
        token: "wrapped-nxm",
        symbol: "wNXM",
        icon: "\u{1F6E1}\u{FE0F}",
        address: Some("0x0d438f3b5175bebc262bf23753c1e53d03432bde"),
        chain: "ethereum",
        // on-chain governance, no Snapshot space
        space: None,
        proxy_ok: true,
        forum_fallback_space: None,
    },
];

pub fn spec(id: &str) -> Option<&'static SourceSpec> {
    WATCHLIST.iter().find(|s| s.id == id)
}

/// Normalize a forum/video title: decode HTML entities, collapse whitespace.
pub fn normalize_title(s: &str) -> String {
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    let decoded = html_escape::decode_html_entities(s).to_string();
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

/// One Gemini `generateContent` call; returns the first candidate's text.
pub async fn gemini_generate(
    fetch: &FetchClient,
    api_key: &str,
    model: &str,
    prompt: &str,
) -> Result<String> {
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key={api_key}"
    );
    let body = serde_json::json!({
        "contents": [{ "parts": [{ "text": prompt }] }]
    });
    let resp = fetch.post_json(&url, &body, &[]).await?;
    candidate_text(&resp).ok_or_else(|| anyhow!("gemini response had no candidate text"))
}

fn candidate_text(resp: &Value) -> Option<String> {
    let text = resp
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()?;
    Some(text.trim().to_string())
}
