//! Run coordinator: one sync cycle end to end.
//!
//! Two guards keep cycles exclusive. In-process, an atomic state word
//! rejects overlapping local triggers. Cross-process, a named Postgres
//! advisory lock admits one worker cluster-wide; losing the race is a
//! clean skip, never a queue. The lock is held for the full cycle and
//! released on every exit path, and the state word always returns to
//! `Idle` no matter where a failure happened.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info, warn};
use wbt_client::TariffSource;
use wbt_db::{ReconcileReport, SYNC_LOCK_KEY};
use wbt_export::SheetExporter;

/// Coordinator lifecycle. A second trigger is accepted only in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Locking,
    Running,
    Exporting,
}

impl CoordinatorState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CoordinatorState::Locking,
            2 => CoordinatorState::Running,
            3 => CoordinatorState::Exporting,
            _ => CoordinatorState::Idle,
        }
    }
}

const IDLE: u8 = 0;
const LOCKING: u8 = 1;
const RUNNING: u8 = 2;
const EXPORTING: u8 = 3;

/// How one triggered run ended. Skips are not errors.
#[derive(Debug)]
pub enum RunOutcome {
    /// Fetch + reconcile completed; export was triggered if the report
    /// showed changes.
    Completed(ReconcileReport),
    /// A local run was already in flight.
    SkippedBusy,
    /// Another process holds the advisory lock.
    SkippedLocked,
}

/// Single-instance-per-process coordinator, shared with scheduler
/// callbacks via `Arc`. Holds its own state explicitly; no globals.
pub struct SyncCoordinator {
    pool: PgPool,
    source: Arc<dyn TariffSource>,
    exporter: Arc<dyn SheetExporter>,
    lock_key: String,
    state: AtomicU8,
}

impl SyncCoordinator {
    pub fn new(
        pool: PgPool,
        source: Arc<dyn TariffSource>,
        exporter: Arc<dyn SheetExporter>,
    ) -> Self {
        Self {
            pool,
            source,
            exporter,
            lock_key: SYNC_LOCK_KEY.to_string(),
            state: AtomicU8::new(IDLE),
        }
    }

    /// Override the advisory-lock key. Production keeps the fixed task
    /// key; tests use distinct keys so they do not contend.
    pub fn with_lock_key(mut self, key: impl Into<String>) -> Self {
        self.lock_key = key.into();
        self
    }

    pub fn state(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Run one sync cycle: lock, fetch, validate, reconcile, and export
    /// when anything changed.
    ///
    /// Errors abort only this run; the state word is reset before they
    /// propagate, so the next trigger starts clean.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        if self
            .state
            .compare_exchange(IDLE, LOCKING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("previous run still in progress, skipping this trigger");
            return Ok(RunOutcome::SkippedBusy);
        }

        let result = self.run_locked().await;
        self.state.store(IDLE, Ordering::SeqCst);
        result
    }

    async fn run_locked(&self) -> Result<RunOutcome> {
        let lock = match wbt_db::try_acquire(&self.pool, &self.lock_key).await? {
            Some(lock) => lock,
            None => {
                info!(key = %self.lock_key, "another worker holds the lock, skipping this run");
                return Ok(RunOutcome::SkippedLocked);
            }
        };

        self.state.store(RUNNING, Ordering::SeqCst);
        let outcome = self.sync_cycle().await;

        // Release happens whether the cycle succeeded or not.
        if let Err(e) = lock.release().await {
            error!(error = %e, "failed to release advisory lock");
        }

        outcome.map(RunOutcome::Completed)
    }

    async fn sync_cycle(&self) -> Result<ReconcileReport> {
        let day = Utc::now().date_naive();

        let snapshot = self
            .source
            .fetch(day)
            .await
            .context("tariff fetch failed")?;
        let report = wbt_db::reconcile(&self.pool, &snapshot, day)
            .await
            .context("reconcile failed")?;

        if report.total_changes() > 0 {
            self.state.store(EXPORTING, Ordering::SeqCst);
            info!(changes = report.total_changes(), "changes detected, exporting");
            // Reconciliation is already committed; an export failure is
            // logged and does not fail the run.
            if let Err(e) = self.export_day().await {
                error!(error = %e, "export failed");
            }
        } else {
            info!("no changes detected, skipping export");
        }

        Ok(report)
    }

    /// Export today's reconciled rows unconditionally. Used by the
    /// change-gated path and by the daily export schedule.
    pub async fn export_day(&self) -> Result<usize> {
        let day = Utc::now().date_naive();
        let rows = wbt_db::fetch_day_rows(&self.pool, day)
            .await
            .context("export read-back failed")?;
        if rows.is_empty() {
            info!(%day, "no warehouse data to export");
            return Ok(0);
        }

        let title = wbt_export::sheet_title(day);
        let table = wbt_export::build_rows(&rows);
        let written = self
            .exporter
            .upload(&title, table)
            .await
            .context("sheet upload failed")?;
        info!(title, rows = written, "export complete");
        Ok(written)
    }

    /// Scheduler entry point for the sync cycle: everything is caught
    /// at this boundary and logged with duration, so no run failure can
    /// crash the process.
    pub async fn run_scheduled(&self) {
        let started = Instant::now();
        info!("scheduled sync run start");
        match self.run_once().await {
            Ok(RunOutcome::Completed(report)) => {
                info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    report = %serde_json::json!(report),
                    "scheduled sync run complete"
                );
            }
            Ok(RunOutcome::SkippedBusy) | Ok(RunOutcome::SkippedLocked) => {
                info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    "scheduled sync run skipped"
                );
            }
            Err(e) => {
                error!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    error = %format!("{e:#}"),
                    "scheduled sync run failed"
                );
            }
        }
    }

    /// Scheduler entry point for the daily unconditional export.
    pub async fn export_scheduled(&self) {
        let started = Instant::now();
        info!("scheduled daily export start");
        match self.export_day().await {
            Ok(rows) => info!(
                duration_ms = started.elapsed().as_millis() as u64,
                rows, "scheduled daily export complete"
            ),
            Err(e) => error!(
                duration_ms = started.elapsed().as_millis() as u64,
                error = %format!("{e:#}"),
                "scheduled daily export failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for (v, s) in [
            (IDLE, CoordinatorState::Idle),
            (LOCKING, CoordinatorState::Locking),
            (RUNNING, CoordinatorState::Running),
            (EXPORTING, CoordinatorState::Exporting),
        ] {
            assert_eq!(CoordinatorState::from_u8(v), s);
        }
        assert_eq!(CoordinatorState::from_u8(200), CoordinatorState::Idle);
    }
}
