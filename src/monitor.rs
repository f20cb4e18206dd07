//! Tick orchestration: one heartbeat drives every due source in sequence.
//!
//! Strictly single-threaded and sequential — each adapter call is awaited
//! before the next starts, with fixed inter-call sleeps, to stay friendly to
//! third-party rate limits. A tick always runs to completion; per-source
//! failures are logged and isolated so one dead source never blocks the
//! rest. State is read once at tick start and written once at tick end.

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::time::Duration;

use crate::classify::AddressRegistry;
use crate::config::Config;
use crate::feed::build_live_feed;
use crate::fetch::FetchClient;
use crate::notify::telegram::TelegramNotifier;
use crate::notify::TopicAlert;
use crate::publish::DashboardPublisher;
use crate::scheduler::{Clock, Scheduler, TaskId};
use crate::sentiment::forum_sentiment;
use crate::sources::collateral::{risk_increased, CollateralAdapter};
use crate::sources::commentary::CommentaryAdapter;
use crate::sources::forum::{ForumAdapter, Topic};
use crate::sources::governance::GovernanceAdapter;
use crate::sources::prices::PriceAdapter;
use crate::sources::summary::SummaryAdapter;
use crate::sources::transfers::TransferAdapter;
use crate::sources::WATCHLIST;
use crate::state::{diff_topics, AggregateState, ForumSnapshot, StateRepository, TopicDiff};

/// Pause between calls to the same third-party API.
const FORUM_DELAY: Duration = Duration::from_millis(200);
const SPACE_DELAY: Duration = Duration::from_millis(300);
const TOKEN_DELAY: Duration = Duration::from_millis(500);
const ALERT_DELAY: Duration = Duration::from_millis(300);

/// New-topic alerts forwarded to Telegram per tick.
const ALERTS_PER_TICK: usize = 3;

/// 24h price move that warrants a log line, percent.
const PRICE_ALERT_PCT: f64 = 5.0;

pub struct Monitor {
    cfg: Config,
    fetch: FetchClient,
    repo: Box<dyn StateRepository>,
    scheduler: Scheduler,
    clock: Box<dyn Clock>,
    publisher: DashboardPublisher,
    registry: AddressRegistry,
    telegram: Option<TelegramNotifier>,
    seeded: bool,
}

impl Monitor {
    pub fn new(cfg: Config, repo: Box<dyn StateRepository>, clock: Box<dyn Clock>) -> Self {
        let fetch = FetchClient::new(cfg.browserless_url.clone());
        let publisher = DashboardPublisher::new(
            cfg.push_url.clone(),
            cfg.refresh_url.clone(),
            cfg.api_key.clone(),
        );
        let registry = AddressRegistry::load_or_builtin(cfg.address_registry_path.as_deref());
        let telegram = TelegramNotifier::from_env();
        Self {
            cfg,
            fetch,
            repo,
            scheduler: Scheduler::new(),
            clock,
            publisher,
            registry,
            telegram,
            seeded: false,
        }
    }

    /// Heartbeat loop; never returns under normal operation.
    pub async fn run(mut self) -> Result<()> {
        self.banner();
        let mut ticker = tokio::time::interval(Duration::from_secs(self.cfg.heartbeat_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One full cycle. Public so tests can drive ticks without timers.
    pub async fn tick(&mut self) {
        let now = self.clock.now();
        let mut state = self.repo.load();
        if !self.seeded {
            self.seed_scheduler(&state);
            self.seeded = true;
        }
        let first_run = state.is_first_run();

        // One-shot: the sink clears the flag when we read it, so it must be
        // honored within this very tick.
        let refresh = self.publisher.check_refresh().await;
        if refresh {
            tracing::info!("manual refresh requested, forcing summaries and transfers");
        }

        let mut alerts: Vec<TopicAlert> = Vec::new();

        if self.scheduler.due(TaskId::Forums, now, refresh) {
            self.poll_forums(&mut state, first_run, now, &mut alerts).await;
            self.scheduler.mark_ran(TaskId::Forums, now);
        }

        if self.scheduler.due(TaskId::Prices, now, refresh) {
            self.poll_prices(&mut state, now).await;
            self.scheduler.mark_ran(TaskId::Prices, now);
        }

        if self.scheduler.due(TaskId::Summaries, now, refresh) {
            self.generate_summaries(&mut state, now).await;
            self.scheduler.mark_ran(TaskId::Summaries, now);
        }

        if self.scheduler.due(TaskId::Transfers, now, refresh) {
            self.poll_transfers(&mut state, now).await;
            self.scheduler.mark_ran(TaskId::Transfers, now);
        }

        if self.scheduler.due(TaskId::Governance, now, refresh) {
            self.poll_governance(&mut state, now).await;
            self.scheduler.mark_ran(TaskId::Governance, now);
        }

        if self.scheduler.due(TaskId::Commentary, now, refresh) {
            self.poll_commentary(&mut state, now).await;
            self.scheduler.mark_ran(TaskId::Commentary, now);
        }

        if self.scheduler.due(TaskId::Collateral, now, refresh) {
            self.poll_collateral(&mut state, now).await;
            self.scheduler.mark_ran(TaskId::Collateral, now);
        }

        state.last_check = Some(now);
        state.live_feed = build_live_feed(&state);
        counter!("monitor_ticks_total").increment(1);
        gauge!("live_feed_items").set(state.live_feed.len() as f64);

        if let Err(e) = self.repo.save(&state) {
            tracing::warn!(error = %e, "state save failed");
        }

        self.log_status(&state);

        match self.publisher.push(&state).await {
            Ok(echo) => {
                tracing::info!(success = echo.success, forums = echo.forums, "dashboard push ok")
            }
            Err(e) => tracing::warn!(error = %e, "dashboard push failed, retrying next tick"),
        }

        self.send_alerts(&alerts).await;
    }

    /// Restart should not re-fire every expensive task at once; pick the
    /// persisted timestamps back up.
    fn seed_scheduler(&mut self, state: &AggregateState) {
        self.scheduler.seed_last_run(TaskId::Summaries, state.last_summary);
        self.scheduler.seed_last_run(TaskId::Transfers, state.last_transfers);
        self.scheduler.seed_last_run(TaskId::Governance, state.last_snapshot);
        self.scheduler.seed_last_run(TaskId::Commentary, state.last_commentary);
        self.scheduler.seed_last_run(TaskId::Collateral, state.last_collateral);
    }

    async fn poll_forums(
        &self,
        state: &mut AggregateState,
        first_run: bool,
        now: DateTime<Utc>,
        alerts: &mut Vec<TopicAlert>,
    ) {
        let adapter = ForumAdapter::new(&self.fetch);
        for spec in WATCHLIST.iter().filter(|s| s.api_url.is_some()) {
            match adapter.fetch_topics(spec).await {
                Ok(topics) => {
                    let prev = state.forums.get(spec.id).map(|f| &f.topics);
                    let TopicDiff {
                        topics: topic_map,
                        entries,
                        new_topics,
                    } = diff_topics(spec.id, prev, &topics, first_run, now);

                    for t in &new_topics {
                        alerts.push(TopicAlert {
                            forum_name: spec.name.to_string(),
                            title: t.title.clone(),
                            link: t.permalink(spec.url),
                        });
                    }
                    state.push_activity(entries);
                    state.forums.insert(
                        spec.id.to_string(),
                        ForumSnapshot {
                            sentiment: Some(forum_sentiment(&topics, now)),
                            topics: topic_map,
                            last_check: Some(now),
                        },
                    );
                }
                Err(e) => {
                    // prior snapshot stays visible, just stale
                    tracing::warn!(source = spec.id, error = %e, "forum poll failed");
                }
            }
            tokio::time::sleep(FORUM_DELAY).await;
        }
    }

    async fn poll_prices(&self, state: &mut AggregateState, now: DateTime<Utc>) {
        match PriceAdapter::new(&self.fetch).fetch_snapshot(WATCHLIST, now).await {
            Ok(snap) => state.prices = Some(snap),
            Err(e) => tracing::warn!(error = %e, "price poll failed, keeping prior snapshot"),
        }
    }

    async fn generate_summaries(&self, state: &mut AggregateState, now: DateTime<Utc>) {
        let Some(key) = &self.cfg.gemini_api_key else {
            return;
        };
        let adapter = SummaryAdapter::new(&self.fetch, key, &self.cfg.gemini_model);
        for spec in WATCHLIST {
            let topics: Vec<Topic> = match state.forums.get(spec.id) {
                Some(snap) => snap.topics.values().cloned().collect(),
                None => continue,
            };
            let summary = adapter.summarize(spec, &topics, now).await;
            tracing::info!(source = spec.id, topics = summary.topics, "forum summarized");
            state.summaries.insert(spec.id.to_string(), summary);
            tokio::time::sleep(TOKEN_DELAY).await;
        }
        state.last_summary = Some(now);
    }

    async fn poll_transfers(&self, state: &mut AggregateState, now: DateTime<Utc>) {
        let Some(key) = &self.cfg.nansen_api_key else {
            return;
        };
        let adapter = TransferAdapter::new(&self.fetch, key);
        for spec in WATCHLIST.iter().filter(|s| s.address.is_some()) {
            match adapter.fetch_token(spec, &self.registry, now).await {
                Ok(flows) => {
                    tracing::info!(
                        source = spec.id,
                        sells = flows.sells.len(),
                        buys = flows.buys.len(),
                        transfers = flows.transfers.len(),
                        "token flows updated"
                    );
                    state.transfers.insert(spec.id.to_string(), flows);
                }
                Err(e) => tracing::warn!(source = spec.id, error = %e, "transfer poll failed"),
            }
            tokio::time::sleep(TOKEN_DELAY).await;
        }
        state.last_transfers = Some(now);
    }

    async fn poll_governance(&self, state: &mut AggregateState, now: DateTime<Utc>) {
        let adapter = GovernanceAdapter::new(&self.fetch);
        for spec in WATCHLIST.iter() {
            let Some(space) = spec.space else { continue };
            match adapter.fetch_space(space, now).await {
                Ok(snap) => {
                    if !snap.proposals.is_empty() {
                        tracing::info!(source = spec.id, votes = snap.proposals.len(), "active votes");
                    }
                    state.snapshot.insert(spec.id.to_string(), snap);
                }
                Err(e) => tracing::warn!(source = spec.id, error = %e, "governance poll failed"),
            }
            tokio::time::sleep(SPACE_DELAY).await;
        }
        state.last_snapshot = Some(now);
    }

    async fn poll_commentary(&self, state: &mut AggregateState, now: DateTime<Utc>) {
        let (Some(key), Some(feed_url)) = (&self.cfg.gemini_api_key, &self.cfg.commentary_feed_url)
        else {
            return;
        };
        let adapter = CommentaryAdapter::new(&self.fetch, key, &self.cfg.gemini_model, feed_url);
        let video = match adapter.latest_video().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "commentary feed poll failed");
                return;
            }
        };
        if !CommentaryAdapter::needs_analysis(state.commentary.as_ref(), &video, now) {
            tracing::debug!(video = %video.video_id, "latest video already analyzed");
            return;
        }
        match adapter.analyze(&video, now).await {
            Ok(report) => {
                tracing::info!(video = %report.video_id, "commentary analyzed");
                state.commentary = Some(report);
                state.last_commentary = Some(now);
            }
            Err(e) => tracing::warn!(error = %e, "commentary analysis failed"),
        }
    }

    async fn poll_collateral(&self, state: &mut AggregateState, now: DateTime<Utc>) {
        let (Some(url), Some(tracked)) = (
            &self.cfg.collateral_subgraph_url,
            &self.cfg.tracked_position,
        ) else {
            return;
        };
        // ETH/USD implied by any quote carrying both legs
        let collateral_usd = state
            .prices
            .as_ref()
            .and_then(|p| p.data.values().find_map(|q| q.implied_eth_usd()));
        let prev = state.collateral.clone();
        let adapter = CollateralAdapter::new(&self.fetch, url, tracked);
        match adapter.fetch_position(collateral_usd, prev.as_ref(), now).await {
            Ok(pos) => {
                if let Some(prev) = &prev {
                    if risk_increased(prev, &pos) {
                        tracing::warn!(analysis = %pos.redemption_analysis, "redemption risk increased");
                    }
                }
                state.collateral = Some(pos);
                state.last_collateral = Some(now);
            }
            Err(e) => tracing::warn!(error = %e, "collateral poll failed"),
        }
    }

    async fn send_alerts(&self, alerts: &[TopicAlert]) {
        let Some(tg) = &self.telegram else { return };
        for alert in alerts.iter().take(ALERTS_PER_TICK) {
            if let Err(e) = tg.send_topic(alert).await {
                tracing::debug!(error = %e, "telegram alert dropped");
            }
            tokio::time::sleep(ALERT_DELAY).await;
        }
    }

    fn banner(&self) {
        tracing::info!(
            forums = WATCHLIST.len(),
            gemini = self.cfg.gemini_api_key.is_some(),
            nansen = self.cfg.nansen_api_key.is_some(),
            telegram = self.telegram.is_some(),
            browser = self.cfg.browserless_url.is_some(),
            collateral = self.cfg.collateral_subgraph_url.is_some(),
            push = %self.cfg.push_url,
            "monitor starting"
        );
    }

    fn log_status(&self, state: &AggregateState) {
        for spec in WATCHLIST {
            let forum = state.forums.get(spec.id);
            let topics = forum.map(|f| f.topics.len()).unwrap_or(0);
            let mood = forum
                .and_then(|f| f.sentiment.as_ref())
                .map(|s| format!("{:?}", s.mood))
                .unwrap_or_else(|| "?".to_string());
            let quote = state
                .prices
                .as_ref()
                .and_then(|p| p.data.get(spec.token).copied())
                .unwrap_or_default();
            let votes = state
                .snapshot
                .get(spec.id)
                .map(|s| s.proposals.len())
                .unwrap_or(0);
            tracing::info!(
                source = spec.id,
                topics,
                mood = %mood,
                usd = quote.usd.unwrap_or(0.0),
                change_24h = quote.usd_24h_change.unwrap_or(0.0),
                votes,
                "status"
            );
            if let Some(change) = quote.usd_24h_change {
                if change.abs() > PRICE_ALERT_PCT {
                    tracing::info!(
                        symbol = spec.symbol,
                        change_24h = change,
                        "price moved more than {PRICE_ALERT_PCT}%"
                    );
                }
            }
        }
    }
}
