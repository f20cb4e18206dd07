//! Video commentary adapter, two stages: locate the newest relevant video on
//! a channel's Atom feed, then turn its page text into a structured topic
//! breakdown via a generative summarization call.
//!
//! The summarizer is not trusted to return JSON. Free-text responses are
//! stored as the `Raw` variant of [`CommentarySummary`] so the feed builder
//! can handle both shapes exhaustively instead of guessing at an optional
//! field.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};

use crate::fetch::FetchClient;
use crate::sentiment::Mood;
use crate::sources::{gemini_generate, normalize_title};

/// Re-analyze the same video after this long at the latest.
const REANALYZE_AFTER: Duration = Duration::hours(4);
const PAGE_TEXT_CAP: usize = 6000;

/// Titles must hit one of these to count as "relevant" commentary.
const WATCH_KEYWORDS: &[&str] = &[
    "gnosis", "cow", "safe", "stakewise", "nexus", "dao", "governance", "defi",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentaryTopic {
    pub name: String,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentaryAnalysis {
    pub summary: String,
    pub sentiment: Mood,
    #[serde(default)]
    pub topics: Vec<CommentaryTopic>,
}

/// Tagged result of the summarization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum CommentarySummary {
    Structured(CommentaryAnalysis),
    Raw(String),
}

/// One analyzed video, the singleton commentary record in the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentaryReport {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: CommentarySummary,
    pub generated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRef {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

// -- Atom feed wire shapes (YouTube channel feed) --

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(rename = "yt:videoId", alias = "videoId", default)]
    video_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    published: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
}

pub struct CommentaryAdapter<'a> {
    fetch: &'a FetchClient,
    api_key: &'a str,
    model: &'a str,
    feed_url: &'a str,
}

impl<'a> CommentaryAdapter<'a> {
    pub fn new(fetch: &'a FetchClient, api_key: &'a str, model: &'a str, feed_url: &'a str) -> Self {
        Self {
            fetch,
            api_key,
            model,
            feed_url,
        }
    }

    /// Stage (a): the newest relevant video on the channel.
    pub async fn latest_video(&self) -> Result<VideoRef> {
        let xml = self
            .fetch
            .page_text(self.feed_url)
            .await
            .context("channel feed fetch")?;
        latest_relevant_video(&xml)
    }

    /// Stage (b): page text -> summarizer -> structured or raw summary.
    pub async fn analyze(&self, video: &VideoRef, now: DateTime<Utc>) -> Result<CommentaryReport> {
        let page = self
            .fetch
            .page_text(&video.url)
            .await
            .context("video page fetch")?;
        let excerpt: String = page.chars().take(PAGE_TEXT_CAP).collect();

        let prompt = build_prompt(&video.title, &excerpt);
        let text = gemini_generate(self.fetch, self.api_key, self.model, &prompt)
            .await
            .context("commentary summarization")?;

        Ok(CommentaryReport {
            video_id: video.video_id.clone(),
            title: video.title.clone(),
            url: video.url.clone(),
            published_at: video.published_at,
            summary: parse_summary_text(&text),
            generated: now,
        })
    }

    /// Skip the expensive stage (b) while the latest video is unchanged and
    /// the existing analysis is younger than the re-analysis bound.
    pub fn needs_analysis(
        prev: Option<&CommentaryReport>,
        video: &VideoRef,
        now: DateTime<Utc>,
    ) -> bool {
        match prev {
            None => true,
            Some(r) if r.video_id != video.video_id => true,
            Some(r) => now - r.generated > REANALYZE_AFTER,
        }
    }
}

fn build_prompt(title: &str, excerpt: &str) -> String {
    format!(
        "You are summarizing a crypto commentary video titled \"{title}\". \
         Page text follows. Respond with strict JSON only, shape: \
         {{\"summary\": \"2-3 sentences\", \"sentiment\": \"Bullish|Bearish|Neutral\", \
         \"topics\": [{{\"name\": \"...\", \"timestamp\": \"mm:ss or null\"}}]}}.\n\n{excerpt}"
    )
}

/// Parse the channel feed and pick the newest entry whose title matches a
/// watch keyword; with no match, the newest entry stands in.
pub fn latest_relevant_video(xml: &str) -> Result<VideoRef> {
    let feed: AtomFeed = from_str(xml).context("parsing channel atom feed")?;
    if feed.entries.is_empty() {
        bail!("channel feed has no entries");
    }

    let pick = feed
        .entries
        .iter()
        .find(|e| {
            let lower = e.title.to_lowercase();
            WATCH_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .unwrap_or(&feed.entries[0]);

    let url = pick
        .links
        .iter()
        .map(|l| l.href.clone())
        .find(|h| !h.is_empty())
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", pick.video_id));

    Ok(VideoRef {
        video_id: pick.video_id.clone(),
        title: normalize_title(&pick.title),
        url,
        published_at: pick
            .published
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

/// Accept the summarizer's output as structured JSON when possible (fenced or
/// bare), otherwise keep the text verbatim as `Raw`.
pub fn parse_summary_text(text: &str) -> CommentarySummary {
    let candidate = extract_json_block(text);
    match serde_json::from_str::<RawAnalysis>(candidate) {
        Ok(raw) => CommentarySummary::Structured(CommentaryAnalysis {
            summary: raw.summary,
            sentiment: parse_mood(raw.sentiment.as_deref()),
            topics: raw
                .topics
                .into_iter()
                .map(|t| CommentaryTopic {
                    name: t.name,
                    timestamp: t.timestamp,
                })
                .collect(),
        }),
        Err(_) => CommentarySummary::Raw(text.trim().to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    summary: String,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    topics: Vec<RawTopicEntry>,
}

#[derive(Debug, Deserialize)]
struct RawTopicEntry {
    name: String,
    #[serde(default)]
    timestamp: Option<String>,
}

fn parse_mood(s: Option<&str>) -> Mood {
    match s.map(str::to_lowercase).as_deref() {
        Some("bullish") => Mood::Bullish,
        Some("bearish") => Mood::Bearish,
        _ => Mood::Neutral,
    }
}

/// Strip markdown fences and outer prose; returns the widest brace-delimited
/// slice, or the input unchanged when no braces exist.
fn extract_json_block(text: &str) -> &str {
    let t = text.trim();
    match (t.find('{'), t.rfind('}')) {
        (Some(start), Some(end)) if end > start => &t[start..=end],
        _ => t,
    }
}
