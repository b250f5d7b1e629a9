//! Run-scoped data for a monitor run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The run context every monitor step shares.
#[derive(Debug)]
pub struct FocusContext {
    /// The goal screenshots are judged against.
    pub objective: String,
    /// Nudge shown with every intervention.
    pub intervention_message: String,
    stats: Arc<RunStats>,
}

impl FocusContext {
    pub fn new(objective: impl Into<String>, intervention_message: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            intervention_message: intervention_message.into(),
            stats: Arc::new(RunStats::default()),
        }
    }

    /// Counters for this run.  The returned handle stays readable after
    /// the context has moved into the run.
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }
}

/// Counters maintained by the classify and intervene steps.
#[derive(Debug, Default)]
pub struct RunStats {
    checks: AtomicU64,
    violations: AtomicU64,
    last_violation: Mutex<Option<(DateTime<Utc>, String)>>,
    active_violation: Mutex<Option<String>>,
}

impl RunStats {
    pub(crate) fn record_check(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_violation(&self, description: &str) {
        self.violations.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_violation.lock() {
            *last = Some((Utc::now(), description.to_owned()));
        }
    }

    pub(crate) fn set_active_violation(&self, description: Option<String>) {
        if let Ok(mut active) = self.active_violation.lock() {
            *active = description;
        }
    }

    /// The violation the user has not yet acknowledged, if any.
    pub fn active_violation(&self) -> Option<String> {
        self.active_violation.lock().ok().and_then(|a| a.clone())
    }

    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last = self.last_violation.lock().ok().and_then(|l| l.clone());
        StatsSnapshot {
            checks: self.checks(),
            violations: self.violations(),
            last_violation_at: last.as_ref().map(|(at, _)| *at),
            last_violation: last.map(|(_, description)| description),
            active_violation: self.active_violation(),
        }
    }
}

/// A point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub checks: u64,
    pub violations: u64,
    pub last_violation: Option<String>,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub active_violation: Option<String>,
}
