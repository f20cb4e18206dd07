//! Runtime configuration from the environment.
//!
//! Read once at startup. Optional integrations (Gemini, Nansen, Telegram,
//! browser rendering, collateral tracking) switch off when their key is
//! missing — logged at boot, never a crash.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub state_file: PathBuf,
    pub push_url: String,
    pub refresh_url: String,
    pub api_key: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub nansen_api_key: Option<String>,
    pub browserless_url: Option<String>,
    pub address_registry_path: Option<PathBuf>,
    /// Channel Atom feed for the commentary adapter.
    pub commentary_feed_url: Option<String>,
    pub collateral_subgraph_url: Option<String>,
    pub tracked_position: Option<String>,
    pub heartbeat_secs: u64,
}

const DEFAULT_STATE_FILE: &str = ".forum-monitor-state.json";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_HEARTBEAT_SECS: u64 = 60;

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            state_file: var("STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            push_url: var("DASHBOARD_PUSH_URL")
                .unwrap_or_else(|| "http://127.0.0.1:3000/api/push".to_string()),
            refresh_url: var("DASHBOARD_REFRESH_URL")
                .unwrap_or_else(|| "http://127.0.0.1:3000/api/check-refresh".to_string()),
            api_key: var("DASHBOARD_API_KEY").unwrap_or_default(),
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            nansen_api_key: var("NANSEN_API_KEY"),
            browserless_url: var("BROWSERLESS_URL"),
            address_registry_path: var("ADDRESS_REGISTRY_PATH").map(PathBuf::from),
            commentary_feed_url: var("COMMENTARY_FEED_URL"),
            collateral_subgraph_url: var("COLLATERAL_SUBGRAPH_URL"),
            tracked_position: var("TRACKED_POSITION"),
            heartbeat_secs: var("HEARTBEAT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HEARTBEAT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for k in [
            "STATE_FILE",
            "DASHBOARD_PUSH_URL",
            "DASHBOARD_REFRESH_URL",
            "DASHBOARD_API_KEY",
            "GEMINI_API_KEY",
            "GEMINI_MODEL",
            "NANSEN_API_KEY",
            "BROWSERLESS_URL",
            "ADDRESS_REGISTRY_PATH",
            "COMMENTARY_FEED_URL",
            "COLLATERAL_SUBGRAPH_URL",
            "TRACKED_POSITION",
            "HEARTBEAT_SECS",
        ] {
            std::env::remove_var(k);
        }
    }

    #[test]
    #[serial]
    fn defaults_without_env() {
        clear_env();
        let cfg = Config::from_env();
        assert_eq!(cfg.state_file, PathBuf::from(DEFAULT_STATE_FILE));
        assert_eq!(cfg.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(cfg.heartbeat_secs, DEFAULT_HEARTBEAT_SECS);
        assert!(cfg.gemini_api_key.is_none());
        assert!(cfg.nansen_api_key.is_none());
    }

    #[test]
    #[serial]
    fn env_overrides_and_empty_counts_as_missing() {
        clear_env();
        std::env::set_var("HEARTBEAT_SECS", "120");
        std::env::set_var("GEMINI_API_KEY", "");
        std::env::set_var("NANSEN_API_KEY", "nk-1");
        let cfg = Config::from_env();
        assert_eq!(cfg.heartbeat_secs, 120);
        assert!(cfg.gemini_api_key.is_none());
        assert_eq!(cfg.nansen_api_key.as_deref(), Some("nk-1"));
        clear_env();
    }

    #[test]
    #[serial]
    fn bad_heartbeat_falls_back_to_default() {
        clear_env();
        std::env::set_var("HEARTBEAT_SECS", "soon");
        assert_eq!(Config::from_env().heartbeat_secs, DEFAULT_HEARTBEAT_SECS);
        clear_env();
    }
}
