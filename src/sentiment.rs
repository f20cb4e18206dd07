//! Keyword sentiment over forum topic titles.
//!
//! Intentionally crude: fixed positive/negative keyword lists, substring
//! matching, integer score. The forum-level aggregate uses different
//! thresholds (±0.3 on the 20-topic average) than a single title (>0 / <0);
//! both are part of the contract and must not be unified.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::sources::forum::Topic;

const POSITIVE: &[&str] = &[
    "bullish",
    "growth",
    "adoption",
    "partnership",
    "launch",
    "upgrade",
    "success",
    "milestone",
    "approved",
    "passed",
];

const NEGATIVE: &[&str] = &[
    "bearish",
    "hack",
    "exploit",
    "dump",
    "concern",
    "issue",
    "bug",
    "delay",
    "rejected",
    "failed",
];

/// How many of the most recent topics feed the forum-level average.
const FORUM_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    Bullish,
    Bearish,
    Neutral,
}

impl Mood {
    pub fn icon(&self) -> &'static str {
        match self {
            Mood::Bullish => "\u{1F7E2}",
            Mood::Bearish => "\u{1F534}",
            Mood::Neutral => "\u{1F610}",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub score: i32,
    pub mood: Mood,
}

/// Score a single text: +1 per positive keyword present, -1 per negative.
/// Case-insensitive substring match, each keyword counted at most once.
pub fn score_text(text: &str) -> SentimentScore {
    let lower = text.to_lowercase();
    let mut score = 0i32;
    for w in POSITIVE {
        if lower.contains(w) {
            score += 1;
        }
    }
    for w in NEGATIVE {
        if lower.contains(w) {
            score -= 1;
        }
    }
    let mood = match score {
        s if s > 0 => Mood::Bullish,
        s if s < 0 => Mood::Bearish,
        _ => Mood::Neutral,
    };
    SentimentScore { score, mood }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumSentiment {
    pub score: f64,
    pub mood: Mood,
    pub activity_24h: u64,
}

/// Forum-level sentiment: average single-topic score over the most recent
/// topics, with the wider ±0.3 mood band, plus a 24h post-activity tally.
pub fn forum_sentiment(topics: &[Topic], now: DateTime<Utc>) -> ForumSentiment {
    let recent = &topics[..topics.len().min(FORUM_WINDOW)];
    if recent.is_empty() {
        return ForumSentiment {
            score: 0.0,
            mood: Mood::Neutral,
            activity_24h: 0,
        };
    }

    let mut total = 0i64;
    let mut activity = 0u64;
    for t in recent {
        total += score_text(&t.title).score as i64;
        if let Some(posted) = t.last_posted_at_utc() {
            if now - posted < Duration::hours(24) {
                activity += t.posts_count;
            }
        }
    }

    let avg = total as f64 / recent.len() as f64;
    let mood = if avg > 0.3 {
        Mood::Bullish
    } else if avg < -0.3 {
        Mood::Bearish
    } else {
        Mood::Neutral
    };

    ForumSentiment {
        score: (avg * 100.0).round() / 100.0,
        mood,
        activity_24h: activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(title: &str, posts: u64, posted_at: &str) -> Topic {
        Topic {
            id: 1,
            title: title.to_string(),
            slug: "t".to_string(),
            posts_count: posts,
            views: 0,
            like_count: 0,
            last_posted_at: Some(posted_at.to_string()),
            last_poster: None,
        }
    }

    #[test]
    fn positive_only_is_bullish() {
        let s = score_text("Partnership launch approved");
        assert_eq!(s.score, 3);
        assert_eq!(s.mood, Mood::Bullish);
    }

    #[test]
    fn negative_only_is_bearish() {
        let s = score_text("Exploit found, upgrade delayed... delay confirmed");
        assert!(s.score < 0);
        assert_eq!(s.mood, Mood::Bearish);
    }

    #[test]
    fn empty_text_is_neutral() {
        assert_eq!(score_text("").mood, Mood::Neutral);
        assert_eq!(score_text("weekly community call").mood, Mood::Neutral);
    }

    #[test]
    fn scoring_is_case_insensitive() {
        assert_eq!(score_text("BULLISH GROWTH"), score_text("bullish growth"));
    }

    #[test]
    fn mixed_keywords_cancel_out() {
        let s = score_text("bullish on the launch despite the hack and the delay");
        assert_eq!(s.score, 0);
        assert_eq!(s.mood, Mood::Neutral);
    }

    #[test]
    fn forum_average_uses_wider_band() {
        let now = Utc::now();
        let ts = now.to_rfc3339();
        // one positive title among four neutral: avg 0.2, inside the band
        let topics = vec![
            topic("launch", 1, &ts),
            topic("meeting notes", 1, &ts),
            topic("weekly recap", 1, &ts),
            topic("call agenda", 1, &ts),
            topic("misc", 1, &ts),
        ];
        let fs = forum_sentiment(&topics, now);
        assert_eq!(fs.mood, Mood::Neutral);
        assert!(fs.score > 0.0);
    }

    #[test]
    fn activity_counts_only_last_24h() {
        let now = Utc::now();
        let fresh = now.to_rfc3339();
        let stale = (now - Duration::hours(30)).to_rfc3339();
        let topics = vec![topic("a", 5, &fresh), topic("b", 7, &stale)];
        let fs = forum_sentiment(&topics, now);
        assert_eq!(fs.activity_24h, 5);
    }
}
