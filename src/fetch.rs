//! Resilient HTTP/JSON fetching.
//!
//! Forum APIs occasionally put their `latest.json` behind bot protection.
//! The client first tries a direct GET with a browser-like User-Agent; if the
//! response looks blocked and the caller tolerates proxying, it walks an
//! ordered list of public CORS proxies. A proxied body only counts when it
//! contains the caller's sentinel key — proxies love returning their own
//! error pages with status 200.
//!
//! There is no backoff here by design: a failed source stays failed until its
//! next cadence boundary.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const BROWSER_UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Per-call fetch behavior: may this source be proxied, and which top-level
/// key proves the payload is the real thing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchPolicy {
    pub allow_proxy: bool,
    pub sentinel: Option<&'static str>,
}

impl FetchPolicy {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn proxied(sentinel: &'static str) -> Self {
        Self {
            allow_proxy: true,
            sentinel: Some(sentinel),
        }
    }
}

/// One way of getting a URL's JSON body. The fallback chain is a list of
/// these, tried in order — configuration, not nested control flow.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    async fn fetch(&self, client: &Client, url: &str) -> Result<Value>;
    fn name(&self) -> &'static str;
}

struct Direct;

#[async_trait]
impl FetchStrategy for Direct {
    async fn fetch(&self, client: &Client, url: &str) -> Result<Value> {
        let resp = client
            .get(url)
            .header("User-Agent", BROWSER_UA)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("direct get")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("direct get returned {status}");
        }
        resp.json::<Value>().await.context("direct body parse")
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Public CORS proxy that takes the target URL as an encoded suffix.
struct CorsProxy {
    prefix: &'static str,
    label: &'static str,
}

#[async_trait]
impl FetchStrategy for CorsProxy {
    async fn fetch(&self, client: &Client, url: &str) -> Result<Value> {
        let proxied = format!("{}{}", self.prefix, urlencode(url));
        let resp = client
            .get(&proxied)
            .header("User-Agent", BROWSER_UA)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("proxy {} get", self.label))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("proxy {} returned {status}", self.label);
        }
        resp.json::<Value>()
            .await
            .with_context(|| format!("proxy {} body parse", self.label))
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

/// Minimal percent-encoding for a URL embedded as a query suffix.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

pub struct FetchClient {
    client: Client,
    proxies: Vec<Box<dyn FetchStrategy>>,
    browserless_url: Option<String>,
}

impl FetchClient {
    pub fn new(browserless_url: Option<String>) -> Self {
        let proxies: Vec<Box<dyn FetchStrategy>> = vec![
            Box::new(CorsProxy {
                prefix: "https://corsproxy.io/?url=",
                label: "corsproxy",
            }),
            Box::new(CorsProxy {
                prefix: "https://api.allorigins.win/raw?url=",
                label: "allorigins",
            }),
        ];
        Self {
            client: Client::new(),
            proxies,
            browserless_url,
        }
    }

    /// GET a JSON document. Direct first; on failure, the proxy chain when
    /// the policy allows it. Errors here mean "source unavailable this
    /// cycle" — callers keep their previous state and move on.
    pub async fn get_json(&self, url: &str, policy: FetchPolicy) -> Result<Value> {
        let direct_err = match Direct.fetch(&self.client, url).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if !policy.allow_proxy {
            return Err(direct_err);
        }

        tracing::debug!(url, error = %direct_err, "direct fetch failed, trying proxies");
        for proxy in &self.proxies {
            counter!("fetch_proxy_attempts_total").increment(1);
            match proxy.fetch(&self.client, url).await {
                Ok(v) => {
                    if let Some(key) = policy.sentinel {
                        if v.get(key).is_none() {
                            tracing::debug!(proxy = proxy.name(), key, "sentinel missing");
                            continue;
                        }
                    }
                    return Ok(v);
                }
                Err(e) => {
                    tracing::debug!(proxy = proxy.name(), error = %e, "proxy fetch failed");
                }
            }
        }

        Err(direct_err.context("all fetch strategies exhausted"))
    }

    /// POST a JSON body, returning the parsed JSON response. Non-success
    /// statuses are errors carrying the status code.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value> {
        let mut req = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(body);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let resp = req.send().await.context("post send")?;
        let status = resp.status();
        if !status.is_success() {
            let snippet: String = resp.text().await.unwrap_or_default().chars().take(200).collect();
            return Err(anyhow!("post to {url} returned {status}: {snippet}"));
        }
        resp.json::<Value>().await.context("post body parse")
    }

    /// Plain-text page body. When a browser-automation endpoint is
    /// configured, a rendering session is acquired for this one call
    /// (navigate, extract, released on drop) — some sources only produce
    /// their content after client-side rendering. Falls back to a plain GET
    /// when the endpoint is missing or failing.
    pub async fn page_text(&self, url: &str) -> Result<String> {
        if let Some(base) = &self.browserless_url {
            match self.render_page(base, url).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(error = %e, "browser render failed, falling back to plain fetch");
                }
            }
        }
        let resp = self
            .client
            .get(url)
            .header("User-Agent", BROWSER_UA)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("plain page get")?;
        resp.text().await.context("plain page body")
    }

    async fn render_page(&self, base: &str, url: &str) -> Result<String> {
        let endpoint = format!("{}/content", base.trim_end_matches('/'));
        let resp = self
            .client
            .post(&endpoint)
            .timeout(Duration::from_secs(45))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .context("render session")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("render endpoint returned {status}");
        }
        resp.text().await.context("render body")
    }
}
