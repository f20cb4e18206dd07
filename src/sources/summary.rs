//! Hourly AI forum summaries via Gemini.
//!
//! Only topics active in the last 24h feed the prompt; a quiet forum
//! short-circuits without an API call. Summarizer failures degrade to a
//! placeholder text, never to a missing entry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::FetchClient;
use crate::sources::{gemini_generate, SourceSpec};
use crate::sources::forum::Topic;

const PROMPT_TOPIC_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumSummary {
    pub text: String,
    /// Number of 24h-active topics the summary covers.
    pub topics: usize,
    pub generated: DateTime<Utc>,
}

pub struct SummaryAdapter<'a> {
    fetch: &'a FetchClient,
    api_key: &'a str,
    model: &'a str,
}

impl<'a> SummaryAdapter<'a> {
    pub fn new(fetch: &'a FetchClient, api_key: &'a str, model: &'a str) -> Self {
        Self {
            fetch,
            api_key,
            model,
        }
    }

    /// Summarize one forum's recent activity. Always returns a summary;
    /// API failures produce a placeholder with the topic count intact.
    pub async fn summarize(
        &self,
        spec: &SourceSpec,
        topics: &[Topic],
        now: DateTime<Utc>,
    ) -> ForumSummary {
        let recent: Vec<&Topic> = topics
            .iter()
            .filter(|t| {
                t.last_posted_at_utc()
                    .map(|ts| now - ts < Duration::hours(24))
                    .unwrap_or(false)
            })
            .collect();

        if recent.is_empty() {
            return ForumSummary {
                text: "No activity in the last 24 hours.".to_string(),
                topics: 0,
                generated: now,
            };
        }

        let prompt = build_prompt(spec.name, &recent);
        let text = match gemini_generate(self.fetch, self.api_key, self.model, &prompt).await {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => {
                tracing::warn!(source = spec.id, "summarizer returned empty text");
                "Summary generation returned no text.".to_string()
            }
            Err(e) => {
                tracing::warn!(source = spec.id, error = %e, "summarizer unavailable");
                "Summary temporarily unavailable.".to_string()
            }
        };

        ForumSummary {
            text,
            topics: recent.len(),
            generated: now,
        }
    }
}

fn build_prompt(forum_name: &str, recent: &[&Topic]) -> String {
    let topic_list = recent
        .iter()
        .take(PROMPT_TOPIC_CAP)
        .map(|t| format!("{} ({} posts)", t.title, t.posts_count))
        .collect::<Vec<_>>()
        .join(". ");
    format!(
        "Summarize the recent activity on the {forum_name} crypto governance forum. \
         Topics: {topic_list}. Write 2-3 sentences about governance proposals, \
         updates or risks. Be concise."
    )
}
