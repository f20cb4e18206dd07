// tests/feed_bounds.rs
use chrono::{Duration, Utc};
use std::collections::BTreeMap;

use dao_activity_monitor::feed::{build_live_feed, FeedCategory, FEED_CAP};
use dao_activity_monitor::sources::governance::{GovernanceSnapshot, Proposal};
use dao_activity_monitor::sources::prices::{PriceQuote, PriceSnapshot};
use dao_activity_monitor::state::{ActivityEntry, ActivityKind, AggregateState, ForumSnapshot};

fn quote(change: f64) -> PriceQuote {
    PriceQuote {
        usd: Some(100.0),
        usd_24h_change: Some(change),
        ..Default::default()
    }
}

#[test]
fn feed_never_exceeds_cap_and_is_time_ordered() {
    let now = Utc::now();
    let mut state = AggregateState::default();
    state.last_check = Some(now);
    state.forums.insert(
        "gnosis".to_string(),
        ForumSnapshot {
            topics: BTreeMap::new(),
            sentiment: None,
            last_check: Some(now),
        },
    );

    state.activity = (0..90u64)
        .map(|i| ActivityEntry {
            kind: ActivityKind::New,
            source_id: if i % 2 == 0 { "gnosis" } else { "cow" }.to_string(),
            title: format!("topic {i}"),
            slug: format!("topic-{i}"),
            topic_id: i,
            new_posts_delta: None,
            time: now - Duration::minutes(i as i64),
        })
        .collect();

    let mut data = BTreeMap::new();
    data.insert("gnosis".to_string(), quote(8.0));
    data.insert("safe".to_string(), quote(-3.5));
    state.prices = Some(PriceSnapshot {
        timestamp: now,
        data,
    });

    state.snapshot.insert(
        "gnosis".to_string(),
        GovernanceSnapshot {
            proposals: vec![Proposal {
                id: "0xp".to_string(),
                title: "GIP-55".to_string(),
                state: "active".to_string(),
                end: now.timestamp() + 86_400,
                choices: vec!["For".to_string(), "Against".to_string()],
                scores: vec![10.0, 2.0],
                scores_total: 12.0,
                link: "https://snapshot.org/#/gnosis.eth/proposal/0xp".to_string(),
            }],
            updated: Some(now),
        },
    );

    let feed = build_live_feed(&state);
    assert!(feed.len() <= FEED_CAP);
    for pair in feed.windows(2) {
        assert!(pair[0].time >= pair[1].time, "feed must be newest-first");
    }
    assert!(feed.iter().any(|i| i.category == FeedCategory::Governance));
    assert!(feed.iter().any(|i| i.category == FeedCategory::Sentiment));
}

#[test]
fn price_threshold_is_three_percent_absolute() {
    let now = Utc::now();
    let mut state = AggregateState::default();
    let mut data = BTreeMap::new();
    data.insert("gnosis".to_string(), quote(6.2)); // in
    data.insert("cow-protocol".to_string(), quote(1.0)); // out
    data.insert("safe".to_string(), quote(-3.1)); // in (absolute)
    state.prices = Some(PriceSnapshot {
        timestamp: now,
        data,
    });

    let feed = build_live_feed(&state);
    let price_items: Vec<_> = feed
        .iter()
        .filter(|i| i.category == FeedCategory::Price)
        .collect();
    assert_eq!(price_items.len(), 2);
    assert!(price_items
        .iter()
        .any(|i| i.title.contains("GNO") && i.icon == "\u{1F680}"));
    assert!(price_items
        .iter()
        .any(|i| i.title.contains("SAFE") && i.icon == "\u{1F4C9}"));
    assert!(!price_items.iter().any(|i| i.title.contains("COW")));
}

#[test]
fn rebuild_is_pure_over_state() {
    let now = Utc::now();
    let mut state = AggregateState::default();
    let mut data = BTreeMap::new();
    data.insert("gnosis".to_string(), quote(4.0));
    state.prices = Some(PriceSnapshot {
        timestamp: now,
        data,
    });
    assert_eq!(build_live_feed(&state), build_live_feed(&state));
}
