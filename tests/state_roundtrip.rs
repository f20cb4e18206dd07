// tests/state_roundtrip.rs
// save(load()) must produce a file that parses back to a structurally equal
// state — the file is rewritten wholesale, so any drift would compound.

use chrono::Utc;
use std::collections::BTreeMap;

use dao_activity_monitor::classify::TradeType;
use dao_activity_monitor::sources::commentary::{
    CommentaryAnalysis, CommentaryReport, CommentarySummary, CommentaryTopic,
};
use dao_activity_monitor::sources::forum::Topic;
use dao_activity_monitor::sources::prices::{PriceQuote, PriceSnapshot};
use dao_activity_monitor::sources::transfers::{TokenFlows, TransferRecord};
use dao_activity_monitor::state::{
    ActivityEntry, ActivityKind, AggregateState, FileStateRepository, ForumSnapshot,
    StateRepository,
};

fn populated_state() -> AggregateState {
    let now = Utc::now();
    let mut topics = BTreeMap::new();
    topics.insert(
        7,
        Topic {
            id: 7,
            title: "GIP-7: Fee switch".to_string(),
            slug: "gip-7-fee-switch".to_string(),
            posts_count: 12,
            views: 340,
            like_count: 9,
            last_posted_at: Some(now.to_rfc3339()),
            last_poster: Some("bob".to_string()),
        },
    );

    let mut state = AggregateState::default();
    state.forums.insert(
        "gnosis".to_string(),
        ForumSnapshot {
            topics,
            sentiment: None,
            last_check: Some(now),
        },
    );
    state.activity = vec![ActivityEntry {
        kind: ActivityKind::Update,
        source_id: "gnosis".to_string(),
        title: "GIP-7: Fee switch".to_string(),
        slug: "gip-7-fee-switch".to_string(),
        topic_id: 7,
        new_posts_delta: Some(2),
        time: now,
    }];
    let mut data = BTreeMap::new();
    data.insert(
        "gnosis".to_string(),
        PriceQuote {
            usd: Some(181.2),
            usd_24h_change: Some(-1.4),
            usd_market_cap: Some(4.6e8),
            eth: Some(0.0452),
        },
    );
    state.prices = Some(PriceSnapshot {
        timestamp: now,
        data,
    });
    state.transfers.insert(
        "cow".to_string(),
        TokenFlows {
            sells: vec![TransferRecord {
                from_address: "0xaaaa000000000000000000000000000000000001".to_string(),
                from_label: None,
                to_address: "0x9008d19f58aabd9ed0d60971565aa8510560ab41".to_string(),
                to_label: Some("CoW settlement".to_string()),
                amount: 15000.0,
                value_usd: 4800.0,
                tx_hash: "0xdead".to_string(),
                timestamp: Some(now.to_rfc3339()),
                trade_type: TradeType::Sell,
            }],
            buys: vec![],
            transfers: vec![],
            updated: Some(now),
        },
    );
    state.commentary = Some(CommentaryReport {
        video_id: "abc123".to_string(),
        title: "Gnosis deep dive".to_string(),
        url: "https://www.youtube.com/watch?v=abc123".to_string(),
        published_at: Some(now),
        summary: CommentarySummary::Structured(CommentaryAnalysis {
            summary: "Mostly constructive.".to_string(),
            sentiment: dao_activity_monitor::sentiment::Mood::Bullish,
            topics: vec![CommentaryTopic {
                name: "GNO staking".to_string(),
                timestamp: Some("03:20".to_string()),
            }],
        }),
        generated: now,
    });
    state.last_check = Some(now);
    state
}

#[test]
fn save_then_load_is_structurally_equal() {
    let path = std::env::temp_dir().join(format!(
        "dao-monitor-roundtrip-{}.json",
        std::process::id()
    ));
    let repo = FileStateRepository::new(path.clone());

    let state = populated_state();
    repo.save(&state).expect("save");
    let loaded = repo.load();
    assert_eq!(loaded, state);

    // idempotence: saving the loaded state reproduces it again
    repo.save(&loaded).expect("second save");
    assert_eq!(repo.load(), loaded);

    let _ = std::fs::remove_file(path);
}

#[test]
fn state_file_is_pretty_printed_with_wire_keys() {
    let path = std::env::temp_dir().join(format!(
        "dao-monitor-prettyprint-{}.json",
        std::process::id()
    ));
    let repo = FileStateRepository::new(path.clone());
    repo.save(&populated_state()).expect("save");

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains('\n'), "state file should be human-readable");
    // camelCase keys mirror the dashboard push body
    assert!(raw.contains("\"lastCheck\""));
    assert!(raw.contains("\"liveFeed\""));
    assert!(raw.contains("\"newPostsDelta\""));

    let _ = std::fs::remove_file(path);
}

#[test]
fn raw_commentary_variant_survives_roundtrip() {
    let mut state = populated_state();
    state.commentary = Some(CommentaryReport {
        video_id: "v".to_string(),
        title: "t".to_string(),
        url: "u".to_string(),
        published_at: None,
        summary: CommentarySummary::Raw("the summarizer rambled".to_string()),
        generated: Utc::now(),
    });
    let json = serde_json::to_string(&state).unwrap();
    let back: AggregateState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, state);
}
