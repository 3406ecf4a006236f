use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    clock::{Clock, DisplayZone},
    db::{Database, PendingTask, ProductionRecord},
    production::{SampleRecord, SampleWindow, ThroughputSource},
};

use super::{
    MachineError, MachineIdentity, MachineState, MachineStatus, StartOutcome,
};

/// Machine state as served to the dashboard.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSnapshot {
    #[serde(flatten)]
    pub identity: MachineIdentity,
    pub status: MachineStatus,
    pub is_running: bool,
    pub has_started: bool,
    /// Local time of day of the first start.
    pub start_time: Option<String>,
    pub run_started_at: Option<DateTime<Utc>>,
    pub last_paused_at: Option<DateTime<Utc>>,
    pub running_seconds: u64,
    pub stop_seconds: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductionReport {
    pub total_actual: u64,
    pub total_expected: u64,
    pub samples: Vec<SampleRecord>,
    pub is_running: bool,
    pub has_started: bool,
    pub running_seconds: u64,
    pub stop_seconds: u64,
}

struct ProductionLine {
    machine: MachineState,
    window: SampleWindow,
}

/// Owns the machine state and the sample window. Every operation takes the
/// one lock, so transitions, sampling ticks and reads never interleave.
#[derive(Clone)]
pub struct MachineController {
    line: Arc<Mutex<ProductionLine>>,
    clock: Arc<dyn Clock>,
    zone: DisplayZone,
    db: Database,
}

impl MachineController {
    pub fn new(
        identity: MachineIdentity,
        window_capacity: usize,
        zone: DisplayZone,
        clock: Arc<dyn Clock>,
        db: Database,
    ) -> Self {
        Self {
            line: Arc::new(Mutex::new(ProductionLine {
                machine: MachineState::new(identity),
                window: SampleWindow::new(window_capacity),
            })),
            clock,
            zone,
            db,
        }
    }

    pub fn zone(&self) -> DisplayZone {
        self.zone
    }

    /// Reinstall anchors saved by a previous process, if any.
    /// Returns whether an in-progress run was recovered.
    pub async fn recover(&self) -> Result<bool> {
        let Some(anchors) = self.db.load_anchors().await? else {
            return Ok(false);
        };
        if !anchors.has_started {
            return Ok(false);
        }

        let mut line = self.line.lock().await;
        let identity = line.machine.identity().clone();
        let mut restored = MachineState::from_anchors(identity, anchors)?;
        restored.refresh(self.clock.now())?;
        line.machine = restored;
        Ok(true)
    }

    pub async fn get_snapshot(&self) -> Result<MachineSnapshot, MachineError> {
        let mut line = self.line.lock().await;
        line.machine.refresh(self.clock.now())?;
        log_totals(&line.machine);
        Ok(self.snapshot_of(&line.machine))
    }

    pub async fn get_report(&self) -> Result<ProductionReport, MachineError> {
        let mut line = self.line.lock().await;
        line.machine.refresh(self.clock.now())?;
        log_totals(&line.machine);

        let (total_actual, total_expected) = line.window.aggregate();
        Ok(ProductionReport {
            total_actual,
            total_expected,
            samples: line.window.snapshot(),
            is_running: line.machine.is_running(),
            has_started: line.machine.has_started(),
            running_seconds: line.machine.running_seconds(),
            stop_seconds: line.machine.stop_seconds(),
        })
    }

    pub async fn start(&self) -> Result<StartOutcome, MachineError> {
        let (outcome, pending) = {
            let mut line = self.line.lock().await;
            let outcome = line.machine.start(self.clock.now())?;
            match outcome {
                StartOutcome::Started => info!("Production started. No previous pause."),
                StartOutcome::Resumed { pause_seconds } => info!(
                    "Production started. Added pause duration: {}s. Total Stop Time: {}s",
                    pause_seconds,
                    line.machine.cumulative_stop_seconds()
                ),
            }
            (outcome, self.queue_anchor_save(&line.machine))
        };

        self.await_anchor_save(pending).await;
        Ok(outcome)
    }

    pub async fn pause(&self) -> Result<(), MachineError> {
        let pending = {
            let mut line = self.line.lock().await;
            let now = self.clock.now();
            line.machine.pause(now)?;
            info!(
                "Production paused at {} (running {}s, stopped {}s)",
                self.zone.date_time_label(now),
                line.machine.running_seconds(),
                line.machine.stop_seconds()
            );
            self.queue_anchor_save(&line.machine)
        };

        self.await_anchor_save(pending).await;
        Ok(())
    }

    pub async fn reset(&self) {
        let pending = {
            let mut line = self.line.lock().await;
            line.machine.reset();
            line.window.reset();
            self.queue_anchor_save(&line.machine)
        };
        info!("Production reset to initial state");

        self.await_anchor_save(pending).await;
    }

    /// One sampling period.
    ///
    /// Nothing is recorded before the first start. A running machine gets a
    /// measured sample that is also written to the store; a paused one gets a
    /// zero sample so the chart has no gaps. The store write happens after the
    /// lock is released and its failure only gets logged.
    pub async fn record_tick(
        &self,
        source: &mut dyn ThroughputSource,
    ) -> Result<Option<SampleRecord>, MachineError> {
        let (sample, record) = {
            let mut line = self.line.lock().await;
            if !line.machine.has_started() {
                return Ok(None);
            }

            let now = self.clock.now();
            line.machine.refresh(now)?;
            let label = self.zone.time_label(now);

            let (sample, record) = if line.machine.is_running() {
                let measured = source.measure();
                let record = ProductionRecord::from_sample(
                    &line.machine,
                    measured.actual_units,
                    measured.expected_units,
                    now,
                );
                (
                    SampleRecord::new(label, measured.actual_units, measured.expected_units, now),
                    Some(record),
                )
            } else {
                (SampleRecord::idle(label, now), None)
            };

            line.window.record(sample.clone());
            (sample, record)
        };

        if let Some(record) = record {
            match self.db.insert_production_record(&record).await {
                Ok(()) => debug!(
                    "Stored sample {} ({}/{} units)",
                    record.id, record.actual_units, record.expected_units
                ),
                Err(err) => error!("Error inserting production record: {err:?}"),
            }
        }

        Ok(Some(sample))
    }

    // Queued while the line lock is held so saves reach the store in
    // transition order.
    fn queue_anchor_save(&self, machine: &MachineState) -> Option<PendingTask<()>> {
        match self.db.queue_anchor_save(machine.anchors()) {
            Ok(pending) => Some(pending),
            Err(err) => {
                error!("Failed to queue machine anchor save: {err:?}");
                None
            }
        }
    }

    async fn await_anchor_save(&self, pending: Option<PendingTask<()>>) {
        let Some(pending) = pending else {
            return;
        };
        if let Err(err) = Database::finish(pending).await {
            error!("Failed to save machine anchors: {err:?}");
        }
    }

    fn snapshot_of(&self, machine: &MachineState) -> MachineSnapshot {
        MachineSnapshot {
            identity: machine.identity().clone(),
            status: machine.status(),
            is_running: machine.is_running(),
            has_started: machine.has_started(),
            start_time: machine.run_started_at().map(|at| self.zone.time_label(at)),
            run_started_at: machine.run_started_at(),
            last_paused_at: machine.last_paused_at(),
            running_seconds: machine.running_seconds(),
            stop_seconds: machine.stop_seconds(),
        }
    }
}

fn log_totals(machine: &MachineState) {
    match machine.status() {
        MachineStatus::NotStarted => {}
        MachineStatus::Running => debug!(
            "Running Time Updated: {}s, Total Stop Time: {}s",
            machine.running_seconds(),
            machine.cumulative_stop_seconds()
        ),
        MachineStatus::Paused => debug!(
            "Stop Time Updated: {}s, Running Time frozen at {}s",
            machine.stop_seconds(),
            machine.running_seconds()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::production::ScriptedThroughput;
    use chrono::TimeZone;

    struct Fixture {
        controller: MachineController,
        clock: Arc<ManualClock>,
        db: Database,
        _dir: tempfile::TempDir,
    }

    fn fixture_with_capacity(capacity: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("packline.sqlite3")).unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 3, 30, 0).unwrap(),
        ));
        let controller = MachineController::new(
            MachineIdentity::default(),
            capacity,
            DisplayZone::from_offset_minutes(330).unwrap(),
            clock.clone(),
            db.clone(),
        );
        Fixture {
            controller,
            clock,
            db,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_capacity(60)
    }

    #[tokio::test]
    async fn ticks_before_start_record_nothing() {
        let f = fixture();
        let mut source = ScriptedThroughput::new(vec![10], 20);

        assert_eq!(f.controller.record_tick(&mut source).await.unwrap(), None);
        let report = f.controller.get_report().await.unwrap();
        assert!(report.samples.is_empty());
        assert!(f.db.list_all_production().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn running_ticks_are_windowed_and_stored() {
        let f = fixture();
        let mut source = ScriptedThroughput::new(vec![10, 15, 20], 20);
        f.controller.start().await.unwrap();

        for _ in 0..3 {
            f.clock.advance_secs(5);
            f.controller.record_tick(&mut source).await.unwrap();
        }

        let report = f.controller.get_report().await.unwrap();
        assert_eq!((report.total_actual, report.total_expected), (45, 60));
        assert_eq!(report.samples.len(), 3);
        assert_eq!(report.samples[0].label, "9:00:05 AM");
        assert_eq!(report.running_seconds, 15);

        let stored = f.db.list_all_production().await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].actual_units, 20);
        assert_eq!(stored[0].running_seconds, 15);
        assert_eq!(stored[2].efficiency, 50.0);
    }

    #[tokio::test]
    async fn paused_ticks_add_zero_samples_without_storing() {
        let f = fixture();
        let mut source = ScriptedThroughput::new(vec![18], 20);
        f.controller.start().await.unwrap();
        f.clock.advance_secs(5);
        f.controller.record_tick(&mut source).await.unwrap();
        f.controller.pause().await.unwrap();
        f.clock.advance_secs(5);

        let sample = f.controller.record_tick(&mut source).await.unwrap().unwrap();
        assert_eq!((sample.actual_units, sample.expected_units), (0, 0));

        let report = f.controller.get_report().await.unwrap();
        assert_eq!((report.total_actual, report.total_expected), (18, 20));
        assert_eq!(report.samples.len(), 2);
        assert_eq!(f.db.list_all_production().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn window_capacity_is_honoured() {
        let f = fixture_with_capacity(4);
        let mut source = ScriptedThroughput::new(vec![1, 2, 3, 4, 5, 6], 10);
        f.controller.start().await.unwrap();
        for _ in 0..6 {
            f.clock.advance_secs(5);
            f.controller.record_tick(&mut source).await.unwrap();
        }

        let report = f.controller.get_report().await.unwrap();
        let actual: Vec<u64> = report.samples.iter().map(|s| s.actual_units).collect();
        assert_eq!(actual, vec![3, 4, 5, 6]);
        assert_eq!(report.total_actual, 18);
    }

    #[tokio::test]
    async fn transitions_follow_the_clock() {
        let f = fixture();
        assert_eq!(f.controller.start().await.unwrap(), StartOutcome::Started);
        assert_eq!(
            f.controller.start().await,
            Err(MachineError::AlreadyRunning)
        );

        f.clock.advance_secs(10);
        f.controller.pause().await.unwrap();
        assert_eq!(f.controller.pause().await, Err(MachineError::AlreadyPaused));

        f.clock.advance_secs(5);
        assert_eq!(
            f.controller.start().await.unwrap(),
            StartOutcome::Resumed { pause_seconds: 5 }
        );

        f.clock.advance_secs(10);
        let snapshot = f.controller.get_snapshot().await.unwrap();
        assert_eq!(snapshot.running_seconds, 20);
        assert_eq!(snapshot.stop_seconds, 5);
        assert_eq!(snapshot.start_time.as_deref(), Some("9:00:00 AM"));
        assert_eq!(snapshot.status, MachineStatus::Running);
    }

    #[tokio::test]
    async fn reset_clears_state_and_window() {
        let f = fixture();
        let mut source = ScriptedThroughput::new(vec![12], 20);
        f.controller.start().await.unwrap();
        f.clock.advance_secs(5);
        f.controller.record_tick(&mut source).await.unwrap();

        f.controller.reset().await;

        let report = f.controller.get_report().await.unwrap();
        assert!(!report.has_started);
        assert!(!report.is_running);
        assert_eq!((report.running_seconds, report.stop_seconds), (0, 0));
        assert!(report.samples.is_empty());
        // history is append-only
        assert_eq!(f.db.list_all_production().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clock_anomaly_surfaces_on_read() {
        let f = fixture();
        f.controller.start().await.unwrap();
        f.clock.advance_secs(-30);

        assert!(matches!(
            f.controller.get_snapshot().await,
            Err(MachineError::ClockAnomaly { .. })
        ));
    }

    #[tokio::test]
    async fn recovered_run_keeps_counting_from_the_first_start() {
        let f = fixture();
        f.controller.start().await.unwrap();
        f.clock.advance_secs(40);
        f.controller.pause().await.unwrap();

        // A new process on the same database, a minute later.
        f.clock.advance_secs(60);
        let restarted = MachineController::new(
            MachineIdentity::default(),
            60,
            DisplayZone::from_offset_minutes(330).unwrap(),
            f.clock.clone(),
            f.db.clone(),
        );
        assert!(restarted.recover().await.unwrap());

        let snapshot = restarted.get_snapshot().await.unwrap();
        assert_eq!(snapshot.status, MachineStatus::Paused);
        assert_eq!(snapshot.running_seconds, 40);
        assert_eq!(snapshot.stop_seconds, 60);

        f.clock.advance_secs(20);
        restarted.start().await.unwrap();
        f.clock.advance_secs(10);
        let snapshot = restarted.get_snapshot().await.unwrap();
        assert_eq!(snapshot.running_seconds, 50);
        assert_eq!(snapshot.stop_seconds, 80);
    }

    #[tokio::test]
    async fn nothing_to_recover_after_reset() {
        let f = fixture();
        f.controller.start().await.unwrap();
        f.controller.reset().await;

        assert!(!f.controller.recover().await.unwrap());
        assert!(!f.controller.get_snapshot().await.unwrap().has_started);
    }

    #[tokio::test]
    async fn failed_store_write_keeps_the_sample() {
        let f = fixture();
        let mut source = ScriptedThroughput::new(vec![12], 20);
        f.controller.start().await.unwrap();
        f.db
            .execute(|conn| {
                conn.execute_batch("DROP TABLE production_data")?;
                Ok(())
            })
            .await
            .unwrap();

        f.clock.advance_secs(5);
        let sample = f.controller.record_tick(&mut source).await.unwrap();
        assert_eq!(sample.map(|s| s.actual_units), Some(12));

        let report = f.controller.get_report().await.unwrap();
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.total_actual, 12);
        assert_eq!(report.running_seconds, 5);
        assert!(report.is_running);
    }

    #[tokio::test]
    async fn failed_anchor_save_keeps_the_transition() {
        let f = fixture();
        f.db
            .execute(|conn| {
                conn.execute_batch("DROP TABLE machine_anchors")?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(f.controller.start().await.unwrap(), StartOutcome::Started);
        f.clock.advance_secs(8);

        let snapshot = f.controller.get_snapshot().await.unwrap();
        assert_eq!(snapshot.status, MachineStatus::Running);
        assert_eq!(snapshot.running_seconds, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transitions_persist_the_final_state() {
        let f = fixture();

        for _ in 0..50 {
            let (a, b) = (f.controller.clone(), f.controller.clone());
            let starter = tokio::spawn(async move { a.start().await.is_ok() });
            let pauser = tokio::spawn(async move { b.pause().await.is_ok() });
            starter.await.unwrap();
            pauser.await.unwrap();
        }

        let saved = f.db.load_anchors().await.unwrap().unwrap();
        let snapshot = f.controller.get_snapshot().await.unwrap();
        assert!(saved.has_started);
        assert_eq!(saved.is_running, snapshot.is_running);
        assert_eq!(saved.run_started_at, snapshot.run_started_at);
        assert_eq!(saved.last_paused_at, snapshot.last_paused_at);
    }
}
