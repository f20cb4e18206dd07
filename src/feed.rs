//! Live feed builder: a pure function from the full aggregate state to the
//! ranked, category-tagged item list the dashboard renders.
//!
//! Recomputed wholesale on every tick; never persisted incrementally. Items
//! sort by time descending with unparsable/missing times last; ties keep the
//! emission order of their producing subsystem (stable sort).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::TradeType;
use crate::sentiment::Mood;
use crate::sources::commentary::CommentarySummary;
use crate::sources::{spec, WATCHLIST};
use crate::state::{ActivityKind, AggregateState};

pub const FEED_CAP: usize = 50;
/// Absolute 24h move that makes a price feed-worthy, percent.
const PRICE_MOVE_PCT: f64 = 3.0;
/// Proposals surfaced per space.
const PROPOSALS_PER_SPACE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedCategory {
    Forum,
    Price,
    Whale,
    Commentary,
    Collateral,
    Sentiment,
    Governance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub icon: String,
    pub title: String,
    pub subtitle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub category: FeedCategory,
}

/// Build the merged feed. Emission order per subsystem: forum activity,
/// price moves, whale transfers, commentary, collateral, sentiment tally,
/// governance — that order is the tie-break for equal timestamps.
pub fn build_live_feed(state: &AggregateState) -> Vec<FeedItem> {
    let mut items = Vec::new();

    forum_items(state, &mut items);
    price_items(state, &mut items);
    transfer_items(state, &mut items);
    commentary_items(state, &mut items);
    collateral_items(state, &mut items);
    sentiment_item(state, &mut items);
    governance_items(state, &mut items);

    // None sorts oldest: Option<DateTime> orders None < Some
    items.sort_by(|a, b| b.time.cmp(&a.time));
    items.truncate(FEED_CAP);
    items
}

fn forum_items(state: &AggregateState, items: &mut Vec<FeedItem>) {
    for entry in &state.activity {
        let (forum_name, forum_url, icon) = match spec(&entry.source_id) {
            Some(s) => (s.name, s.url, s.icon),
            None => continue,
        };
        let (kind, subtitle) = match entry.kind {
            ActivityKind::New => ("new_topic".to_string(), format!("New topic on {forum_name}")),
            ActivityKind::Update => (
                "topic_update".to_string(),
                format!(
                    "+{} posts on {forum_name}",
                    entry.new_posts_delta.unwrap_or(0)
                ),
            ),
        };
        items.push(FeedItem {
            kind,
            icon: icon.to_string(),
            title: entry.title.clone(),
            subtitle,
            link: Some(format!("{}/t/{}/{}", forum_url, entry.slug, entry.topic_id)),
            time: Some(entry.time),
            category: FeedCategory::Forum,
        });
    }
}

fn price_items(state: &AggregateState, items: &mut Vec<FeedItem>) {
    let Some(snap) = &state.prices else { return };
    for source in WATCHLIST {
        let Some(quote) = snap.data.get(source.token) else {
            continue;
        };
        let Some(change) = quote.usd_24h_change else {
            continue;
        };
        if change.abs() < PRICE_MOVE_PCT {
            continue;
        }
        let up = change > 0.0;
        items.push(FeedItem {
            kind: "price_move".to_string(),
            icon: if up { "\u{1F680}" } else { "\u{1F4C9}" }.to_string(),
            title: format!(
                "{} {}{:.1}% (24h)",
                source.symbol,
                if up { "+" } else { "" },
                change
            ),
            subtitle: quote
                .usd
                .map(|p| format!("${p:.3}"))
                .unwrap_or_else(|| "price unavailable".to_string()),
            link: None,
            time: Some(snap.timestamp),
            category: FeedCategory::Price,
        });
    }
}

fn transfer_items(state: &AggregateState, items: &mut Vec<FeedItem>) {
    for source in WATCHLIST {
        let Some(flows) = state.transfers.get(source.id) else {
            continue;
        };
        for kind in [TradeType::Sell, TradeType::Buy, TradeType::Transfer] {
            let Some(top) = flows.top_of(kind) else { continue };
            let label = match kind {
                TradeType::Sell => "sell",
                TradeType::Buy => "buy",
                TradeType::Transfer => "transfer",
            };
            items.push(FeedItem {
                kind: format!("whale_{label}"),
                icon: kind.icon().to_string(),
                title: format!("{} top {label}: ${:.0}", source.symbol, top.value_usd),
                subtitle: format!(
                    "{} -> {}",
                    top.from_label.as_deref().unwrap_or(&short_addr(&top.from_address)),
                    top.to_label.as_deref().unwrap_or(&short_addr(&top.to_address)),
                ),
                link: Some(format!("https://etherscan.io/tx/{}", top.tx_hash)),
                time: flows.updated,
                category: FeedCategory::Whale,
            });
        }
    }
}

fn commentary_items(state: &AggregateState, items: &mut Vec<FeedItem>) {
    let Some(report) = &state.commentary else { return };
    let (subtitle, icon) = match &report.summary {
        CommentarySummary::Structured(a) => {
            let topics = a
                .topics
                .iter()
                .take(3)
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            (
                if topics.is_empty() {
                    a.summary.clone()
                } else {
                    format!("{} — {}", a.summary, topics)
                },
                a.sentiment.icon().to_string(),
            )
        }
        CommentarySummary::Raw(text) => {
            (text.chars().take(140).collect::<String>(), "\u{1F3AC}".to_string())
        }
    };
    items.push(FeedItem {
        kind: "commentary".to_string(),
        icon,
        title: report.title.clone(),
        subtitle,
        link: Some(report.url.clone()),
        time: Some(report.generated),
        category: FeedCategory::Commentary,
    });
}

fn collateral_items(state: &AggregateState, items: &mut Vec<FeedItem>) {
    let Some(pos) = &state.collateral else { return };
    items.push(FeedItem {
        kind: "collateral_status".to_string(),
        icon: "\u{1F3E6}".to_string(),
        title: format!(
            "Position at {:.2}% rate, ${:.1}M in front{}",
            pos.interest_rate * 100.0,
            pos.debt_in_front / 1_000_000.0,
            if pos.stale { " (stale)" } else { "" }
        ),
        subtitle: pos.redemption_analysis.clone(),
        link: None,
        time: Some(pos.updated_at),
        category: FeedCategory::Collateral,
    });
    if pos.redemption_analysis.starts_with("HIGH") {
        items.push(FeedItem {
            kind: "collateral_alert".to_string(),
            icon: "\u{26A0}\u{FE0F}".to_string(),
            title: "Redemption risk is HIGH".to_string(),
            subtitle: pos.redemption_analysis.clone(),
            link: None,
            time: Some(pos.updated_at),
            category: FeedCategory::Collateral,
        });
    }
}

fn sentiment_item(state: &AggregateState, items: &mut Vec<FeedItem>) {
    if state.forums.is_empty() {
        return;
    }
    let mut bullish = 0u32;
    let mut bearish = 0u32;
    let mut neutral = 0u32;
    for snap in state.forums.values() {
        match snap.sentiment.as_ref().map(|s| s.mood) {
            Some(Mood::Bullish) => bullish += 1,
            Some(Mood::Bearish) => bearish += 1,
            _ => neutral += 1,
        }
    }
    let overall = if bullish > bearish {
        Mood::Bullish
    } else if bearish > bullish {
        Mood::Bearish
    } else {
        Mood::Neutral
    };
    items.push(FeedItem {
        kind: "sentiment_tally".to_string(),
        icon: overall.icon().to_string(),
        title: format!("Watchlist mood: {overall:?}"),
        subtitle: format!("{bullish} bullish / {bearish} bearish / {neutral} neutral forums"),
        link: None,
        time: state.last_check,
        category: FeedCategory::Sentiment,
    });
}

fn governance_items(state: &AggregateState, items: &mut Vec<FeedItem>) {
    for source in WATCHLIST {
        let Some(snap) = state.snapshot.get(source.id) else {
            continue;
        };
        for p in snap.proposals.iter().take(PROPOSALS_PER_SPACE) {
            items.push(FeedItem {
                kind: "proposal".to_string(),
                icon: "\u{1F5F3}\u{FE0F}".to_string(),
                title: p.title.clone(),
                subtitle: format!(
                    "{} vote, {:.0} votes cast",
                    source.name, p.scores_total
                ),
                link: Some(p.link.clone()),
                time: snap.updated,
                category: FeedCategory::Governance,
            });
        }
    }
}

fn short_addr(addr: &str) -> String {
    if addr.len() > 10 {
        format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
    } else {
        addr.to_string()
    }
}
