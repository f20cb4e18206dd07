//! Table-driven multi-cadence scheduling.
//!
//! One cadence entry per task, all evaluated against a single heartbeat
//! tick. The clock is injected so cadence logic is testable without real
//! timers. A consumed manual-refresh flag forces exactly the tasks that
//! opted in (`force_on_refresh`), not everything.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    Forums,
    Prices,
    Summaries,
    Transfers,
    Governance,
    Commentary,
    Collateral,
}

impl TaskId {
    pub fn name(&self) -> &'static str {
        match self {
            TaskId::Forums => "forums",
            TaskId::Prices => "prices",
            TaskId::Summaries => "summaries",
            TaskId::Transfers => "transfers",
            TaskId::Governance => "governance",
            TaskId::Commentary => "commentary",
            TaskId::Collateral => "collateral",
        }
    }
}

/// Injected time source; `SystemClock` in the binary, a manual clock in
/// tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
struct CadenceEntry {
    task: TaskId,
    every: Duration,
    last_run: Option<DateTime<Utc>>,
    force_on_refresh: bool,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    table: Vec<CadenceEntry>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Production cadence table. Zero-duration cadences run every heartbeat.
    /// Only the AI-summary and on-chain-transfer tasks re-run on a manual
    /// refresh.
    pub fn new() -> Self {
        let entry = |task, every, force_on_refresh| CadenceEntry {
            task,
            every,
            last_run: None,
            force_on_refresh,
        };
        Self {
            table: vec![
                entry(TaskId::Forums, Duration::zero(), false),
                entry(TaskId::Prices, Duration::zero(), false),
                entry(TaskId::Summaries, Duration::minutes(60), true),
                entry(TaskId::Transfers, Duration::minutes(10), true),
                entry(TaskId::Governance, Duration::minutes(5), false),
                entry(TaskId::Commentary, Duration::minutes(60), false),
                entry(TaskId::Collateral, Duration::minutes(2), false),
            ],
        }
    }

    /// Seed a task's last-run from persisted state so a restart does not
    /// re-fire every expensive task at once.
    pub fn seed_last_run(&mut self, task: TaskId, at: Option<DateTime<Utc>>) {
        if let Some(e) = self.table.iter_mut().find(|e| e.task == task) {
            e.last_run = at;
        }
    }

    /// Is this task due at `now`? Due when it never ran, its cadence has
    /// elapsed, or a manual refresh was consumed this tick and the task opts
    /// into refresh forcing.
    pub fn due(&self, task: TaskId, now: DateTime<Utc>, refresh_requested: bool) -> bool {
        let Some(e) = self.table.iter().find(|e| e.task == task) else {
            return false;
        };
        if refresh_requested && e.force_on_refresh {
            return true;
        }
        match e.last_run {
            None => true,
            Some(last) => now - last > e.every,
        }
    }

    pub fn mark_ran(&mut self, task: TaskId, now: DateTime<Utc>) {
        if let Some(e) = self.table.iter_mut().find(|e| e.task == task) {
            e.last_run = Some(now);
        }
    }

    pub fn last_run(&self, task: TaskId) -> Option<DateTime<Utc>> {
        self.table
            .iter()
            .find(|e| e.task == task)
            .and_then(|e| e.last_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Hand-cranked clock for cadence tests.
    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new(start: DateTime<Utc>) -> Self {
            Self(Mutex::new(start))
        }
        fn advance(&self, d: Duration) {
            let mut t = self.0.lock().unwrap();
            *t += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-20T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn never_run_tasks_are_due() {
        let s = Scheduler::new();
        let now = start();
        assert!(s.due(TaskId::Summaries, now, false));
        assert!(s.due(TaskId::Collateral, now, false));
    }

    #[test]
    fn cadence_gates_rerun() {
        let clock = ManualClock::new(start());
        let mut s = Scheduler::new();
        s.mark_ran(TaskId::Transfers, clock.now());

        clock.advance(Duration::minutes(5));
        assert!(!s.due(TaskId::Transfers, clock.now(), false));

        clock.advance(Duration::minutes(6));
        assert!(s.due(TaskId::Transfers, clock.now(), false));
    }

    #[test]
    fn zero_cadence_runs_every_heartbeat() {
        let clock = ManualClock::new(start());
        let mut s = Scheduler::new();
        s.mark_ran(TaskId::Forums, clock.now());
        clock.advance(Duration::seconds(60));
        assert!(s.due(TaskId::Forums, clock.now(), false));
    }

    #[test]
    fn refresh_forces_only_opted_in_tasks() {
        let clock = ManualClock::new(start());
        let mut s = Scheduler::new();
        let now = clock.now();
        for t in [
            TaskId::Summaries,
            TaskId::Transfers,
            TaskId::Governance,
            TaskId::Commentary,
            TaskId::Collateral,
        ] {
            s.mark_ran(t, now);
        }
        clock.advance(Duration::seconds(30));
        let now = clock.now();

        assert!(s.due(TaskId::Summaries, now, true));
        assert!(s.due(TaskId::Transfers, now, true));
        assert!(!s.due(TaskId::Governance, now, true));
        assert!(!s.due(TaskId::Commentary, now, true));
        assert!(!s.due(TaskId::Collateral, now, true));
    }

    #[test]
    fn seeding_from_persisted_state_suppresses_immediate_rerun() {
        let now = start();
        let mut s = Scheduler::new();
        s.seed_last_run(TaskId::Summaries, Some(now - Duration::minutes(10)));
        assert!(!s.due(TaskId::Summaries, now, false));
        s.seed_last_run(TaskId::Summaries, Some(now - Duration::minutes(61)));
        assert!(s.due(TaskId::Summaries, now, false));
    }
}
