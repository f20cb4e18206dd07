//! Dashboard push and the manual-refresh protocol.
//!
//! At-least-once, overwrite-based delivery: the full state goes out as one
//! POST per tick. A failed push is logged and forgotten — the state file has
//! the data, the next tick pushes again. No mid-cycle retry.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::state::AggregateState;

const PUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// Sink's echo for a push; tolerant of absent fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEcho {
    #[serde(default)]
    pub success: bool,
    /// How many forum substructures the sink merged.
    #[serde(default)]
    pub forums: u64,
    /// The refresh flag as the sink saw it before this push.
    #[serde(default)]
    pub refresh_requested: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshEcho {
    #[serde(default)]
    refresh_requested: bool,
}

pub struct DashboardPublisher {
    client: Client,
    push_url: String,
    refresh_url: String,
    api_key: String,
}

impl DashboardPublisher {
    pub fn new(push_url: String, refresh_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            push_url,
            refresh_url,
            api_key,
        }
    }

    /// POST the full state with the shared-secret header. Errors are
    /// recoverable by contract; the caller logs and waits for the next tick.
    pub async fn push(&self, state: &AggregateState) -> Result<PushEcho> {
        let resp = self
            .client
            .post(&self.push_url)
            .timeout(PUSH_TIMEOUT)
            .header("X-API-Key", &self.api_key)
            .json(state)
            .send()
            .await
            .context("dashboard push send")?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(anyhow!("dashboard rejected the push: bad api key"));
        }
        if !status.is_success() {
            return Err(anyhow!("dashboard push returned {status}"));
        }
        // tolerate sinks that answer 200 with a non-JSON body
        Ok(resp.json::<PushEcho>().await.unwrap_or_default())
    }

    /// Read the manual-refresh flag. The sink clears it on read, so a `true`
    /// here is a one-shot signal the caller must honor in this same tick.
    /// Any failure reads as "no refresh requested".
    pub async fn check_refresh(&self) -> bool {
        let resp = match self
            .client
            .get(&self.refresh_url)
            .timeout(PUSH_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "refresh check unreachable");
                return false;
            }
        };
        match resp.json::<RefreshEcho>().await {
            Ok(echo) => echo.refresh_requested,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_parses_with_missing_fields() {
        let echo: PushEcho = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(echo.success);
        assert_eq!(echo.forums, 0);
        assert!(!echo.refresh_requested);
    }

    #[test]
    fn echo_parses_full_body() {
        let echo: PushEcho =
            serde_json::from_str(r#"{"success": true, "forums": 5, "refreshRequested": true}"#)
                .unwrap();
        assert_eq!(echo.forums, 5);
        assert!(echo.refresh_requested);
    }
}
