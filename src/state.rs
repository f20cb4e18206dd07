//! Persisted aggregate state and the topic differ.
//!
//! The state file is the single shared mutable resource of the process: read
//! once at tick start, written once at tick end, pretty-printed and fully
//! rewritten on every save. Single-writer by contract — the monitor owns the
//! file; the dashboard only ever sees a copy pushed over HTTP.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::FeedItem;
use crate::sentiment::ForumSentiment;
use crate::sources::collateral::CollateralPosition;
use crate::sources::commentary::CommentaryReport;
use crate::sources::forum::Topic;
use crate::sources::governance::GovernanceSnapshot;
use crate::sources::prices::PriceSnapshot;
use crate::sources::summary::ForumSummary;
use crate::sources::transfers::TokenFlows;

/// Activity log bound, newest-first.
pub const ACTIVITY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    New,
    Update,
}

/// Append-only activity record; immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub source_id: String,
    pub title: String,
    pub slug: String,
    pub topic_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_posts_delta: Option<u64>,
    pub time: DateTime<Utc>,
}

/// One forum's poll result: topic map keyed by id, forum-level sentiment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForumSnapshot {
    pub topics: BTreeMap<u64, Topic>,
    pub sentiment: Option<ForumSentiment>,
    pub last_check: Option<DateTime<Utc>>,
}

/// Root aggregate, mirrored key-for-key by the dashboard push body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateState {
    pub forums: BTreeMap<String, ForumSnapshot>,
    pub prices: Option<PriceSnapshot>,
    pub activity: Vec<ActivityEntry>,
    pub summaries: BTreeMap<String, ForumSummary>,
    pub transfers: BTreeMap<String, TokenFlows>,
    pub snapshot: BTreeMap<String, GovernanceSnapshot>,
    pub commentary: Option<CommentaryReport>,
    pub collateral: Option<CollateralPosition>,
    pub live_feed: Vec<FeedItem>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_summary: Option<DateTime<Utc>>,
    pub last_transfers: Option<DateTime<Utc>>,
    pub last_snapshot: Option<DateTime<Utc>>,
    pub last_commentary: Option<DateTime<Utc>>,
    pub last_collateral: Option<DateTime<Utc>>,
}

impl AggregateState {
    /// First run = nothing was ever polled; the differ seeds without
    /// emitting activity.
    pub fn is_first_run(&self) -> bool {
        self.last_check.is_none()
    }

    /// Prepend fresh entries (newest first) and enforce the log bound.
    pub fn push_activity(&mut self, mut entries: Vec<ActivityEntry>) {
        entries.append(&mut std::mem::take(&mut self.activity));
        entries.truncate(ACTIVITY_CAP);
        self.activity = entries;
    }
}

/// Load/save seam so the scheduler and tests can swap the backing store.
/// Implementations are not required to be concurrency-safe: the monitor is
/// the only writer, one tick at a time.
pub trait StateRepository: Send {
    /// Never fails: a missing or corrupt file yields the empty default.
    fn load(&self) -> AggregateState;
    fn save(&self, state: &AggregateState) -> Result<()>;
}

pub struct FileStateRepository {
    path: PathBuf,
}

impl FileStateRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StateRepository for FileStateRepository {
    fn load(&self) -> AggregateState {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "state file corrupt, starting from empty state"
                    );
                    AggregateState::default()
                }
            },
            Err(_) => AggregateState::default(),
        }
    }

    fn save(&self, state: &AggregateState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating state dir {}", dir.display()))?;
            }
        }
        let body = serde_json::to_vec_pretty(state).context("serializing state")?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("writing state file {}", self.path.display()))
    }
}

/// Result of diffing one source's fresh topic page against its prior map.
#[derive(Debug, Default)]
pub struct TopicDiff {
    /// Replacement topic map; always the fresh fetch, never a merge.
    pub topics: BTreeMap<u64, Topic>,
    pub entries: Vec<ActivityEntry>,
    /// Topics that were genuinely new this cycle (for notifications).
    pub new_topics: Vec<Topic>,
}

/// Compare fresh topics with the previous map. On the first run only the
/// baseline is seeded — no `new`/`update` burst on cold start. A topic id
/// can only produce a second `new` entry after an intervening absence from
/// the map.
pub fn diff_topics(
    source_id: &str,
    prev: Option<&BTreeMap<u64, Topic>>,
    fresh: &[Topic],
    first_run: bool,
    now: DateTime<Utc>,
) -> TopicDiff {
    let empty = BTreeMap::new();
    let prev = prev.unwrap_or(&empty);

    let mut diff = TopicDiff::default();
    for topic in fresh {
        match prev.get(&topic.id) {
            None if !first_run => {
                diff.entries.push(ActivityEntry {
                    kind: ActivityKind::New,
                    source_id: source_id.to_string(),
                    title: topic.title.clone(),
                    slug: topic.slug.clone(),
                    topic_id: topic.id,
                    new_posts_delta: None,
                    time: now,
                });
                diff.new_topics.push(topic.clone());
            }
            Some(old) if old.posts_count < topic.posts_count => {
                diff.entries.push(ActivityEntry {
                    kind: ActivityKind::Update,
                    source_id: source_id.to_string(),
                    title: topic.title.clone(),
                    slug: topic.slug.clone(),
                    topic_id: topic.id,
                    new_posts_delta: Some(topic.posts_count - old.posts_count),
                    time: now,
                });
            }
            _ => {}
        }
        diff.topics.insert(topic.id, topic.clone());
    }
    diff
}
