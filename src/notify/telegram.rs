//! Telegram channel for new-topic alerts. Fire-and-forget: a failed send is
//! logged and dropped, never retried, never fatal to the tick.

use anyhow::{anyhow, Result};
use reqwest::Client;
use std::time::Duration;

use super::TopicAlert;

pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    client: Client,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_id: String) -> Self {
        Self {
            token,
            chat_id,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Constructed only when both env vars are present; otherwise the
    /// channel stays disabled for the whole run.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        if token.is_empty() || chat_id.is_empty() {
            return None;
        }
        Some(Self::new(token, chat_id))
    }

    pub async fn send_topic(&self, alert: &TopicAlert) -> Result<()> {
        let text = format!(
            "\u{1F195} <b>{}</b>\n\n<b>{}</b>\n\n\u{1F517} {}",
            alert.forum_name, alert.title, alert.link
        );
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        });
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("telegram send failed: {e}"))?;
        if let Err(e) = resp.error_for_status_ref() {
            return Err(anyhow!("telegram API error: {e}"));
        }
        Ok(())
    }
}
