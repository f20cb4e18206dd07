//! Discourse forum adapter: `latest.json` pages into normalized topics.
//!
//! Sources with `forum_fallback_space` set degrade to Snapshot proposals
//! shaped as topics when the forum itself is unreachable — the board still
//! shows *something* for a forum that blocks us at the network level.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fetch::{FetchClient, FetchPolicy};
use crate::sources::{normalize_title, SourceSpec};

/// Topics kept per forum per poll.
const TOPIC_PAGE_SIZE: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub posts_count: u64,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub like_count: u64,
    pub last_posted_at: Option<String>,
    pub last_poster: Option<String>,
}

impl Topic {
    pub fn last_posted_at_utc(&self) -> Option<DateTime<Utc>> {
        self.last_posted_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn permalink(&self, forum_url: &str) -> String {
        format!("{}/t/{}/{}", forum_url, self.slug, self.id)
    }
}

// Discourse /latest.json wire shape, only the fields we keep.
#[derive(Debug, Deserialize)]
struct LatestPayload {
    topic_list: TopicList,
}

#[derive(Debug, Deserialize)]
struct TopicList {
    #[serde(default)]
    topics: Vec<RawTopic>,
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    id: u64,
    title: String,
    slug: String,
    #[serde(default)]
    posts_count: u64,
    #[serde(default)]
    views: u64,
    #[serde(default)]
    like_count: u64,
    last_posted_at: Option<String>,
    last_poster_username: Option<String>,
}

pub struct ForumAdapter<'a> {
    fetch: &'a FetchClient,
}

impl<'a> ForumAdapter<'a> {
    pub fn new(fetch: &'a FetchClient) -> Self {
        Self { fetch }
    }

    /// Fetch the newest topics for one source. On failure, sources with a
    /// configured governance substitute get proposal-shaped topics instead;
    /// everyone else propagates the error (caller keeps prior state).
    pub async fn fetch_topics(&self, spec: &SourceSpec) -> Result<Vec<Topic>> {
        let api_url = spec
            .api_url
            .context("source has no forum api url")?;
        let policy = if spec.proxy_ok {
            FetchPolicy::proxied("topic_list")
        } else {
            FetchPolicy::direct()
        };

        match self.fetch.get_json(api_url, policy).await {
            Ok(payload) => {
                let topics = topics_from_payload(&payload)
                    .with_context(|| format!("{} latest.json shape", spec.id))?;
                counter!("source_topics_total").increment(topics.len() as u64);
                Ok(topics)
            }
            Err(e) => {
                if let Some(space) = spec.forum_fallback_space {
                    tracing::warn!(
                        source = spec.id,
                        error = %e,
                        "forum unreachable, synthesizing topics from governance space"
                    );
                    counter!("source_forum_fallbacks_total").increment(1);
                    self.fallback_topics(space).await
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Snapshot proposals dressed as topics: id from a hash of the proposal
    /// id, `last_posted_at` = proposal creation time, one post.
    async fn fallback_topics(&self, space: &str) -> Result<Vec<Topic>> {
        let query = format!(
            r#"{{ proposals(first: {TOPIC_PAGE_SIZE}, where: {{space: "{space}"}}, orderBy: "created", orderDirection: desc) {{ id title created link }} }}"#
        );
        let body = serde_json::json!({ "query": query });
        let resp = self
            .fetch
            .post_json("https://hub.snapshot.org/graphql", &body, &[])
            .await
            .context("governance fallback query")?;

        let rows = resp
            .pointer("/data/proposals")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let pid = row.get("id").and_then(Value::as_str).unwrap_or_default();
            if pid.is_empty() {
                continue;
            }
            let title = row
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("(untitled proposal)");
            let created = row.get("created").and_then(Value::as_i64).unwrap_or(0);
            out.push(Topic {
                id: stable_topic_id(pid),
                title: normalize_title(title),
                slug: pid.to_string(),
                posts_count: 1,
                views: 0,
                like_count: 0,
                last_posted_at: DateTime::from_timestamp(created, 0)
                    .map(|dt| dt.to_rfc3339()),
                last_poster: None,
            });
        }
        Ok(out)
    }
}

/// Map the raw payload into normalized topics, newest page order preserved.
/// Separated from the HTTP path so fixtures can exercise it directly.
pub fn topics_from_payload(payload: &Value) -> Result<Vec<Topic>> {
    let parsed: LatestPayload =
        serde_json::from_value(payload.clone()).context("parsing topic_list")?;
    Ok(parsed
        .topic_list
        .topics
        .into_iter()
        .take(TOPIC_PAGE_SIZE)
        .map(|t| Topic {
            id: t.id,
            title: normalize_title(&t.title),
            slug: t.slug,
            posts_count: t.posts_count,
            views: t.views,
            like_count: t.like_count,
            last_posted_at: t.last_posted_at,
            last_poster: t.last_poster_username,
        })
        .collect())
}

/// Deterministic synthetic topic id for proposal-backed topics (FNV-1a,
/// folded to keep clear of real Discourse id ranges).
fn stable_topic_id(proposal_id: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in proposal_id.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash | (1 << 63)
}
