use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MachineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MachineStatus {
    #[default]
    NotStarted,
    Running,
    Paused,
}

/// Static description of the machine and the batch it is working on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineIdentity {
    pub machine_name: String,
    pub batch: String,
    pub batch_size: u32,
    pub product: String,
}

impl Default for MachineIdentity {
    fn default() -> Self {
        Self {
            machine_name: "Ishida-aeZ4K88".into(),
            batch: "xy".into(),
            batch_size: 6000,
            product: "Lays".into(),
        }
    }
}

/// The persisted subset of [`MachineState`]. Everything else is derived from
/// these values plus the current instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountingAnchors {
    pub has_started: bool,
    pub is_running: bool,
    pub run_started_at: Option<DateTime<Utc>>,
    pub last_paused_at: Option<DateTime<Utc>>,
    pub cumulative_stop_seconds: u64,
    pub running_seconds: u64,
    pub stop_seconds: u64,
}

impl AccountingAnchors {
    pub fn validate(&self) -> Result<(), MachineError> {
        if !self.has_started {
            if self.is_running
                || self.run_started_at.is_some()
                || self.last_paused_at.is_some()
                || self.cumulative_stop_seconds != 0
            {
                return Err(MachineError::InconsistentAnchors(
                    "accounting data present before the first start",
                ));
            }
            return Ok(());
        }

        if self.run_started_at.is_none() {
            return Err(MachineError::InconsistentAnchors(
                "started without a start instant",
            ));
        }
        match (self.is_running, self.last_paused_at) {
            (true, Some(_)) => Err(MachineError::InconsistentAnchors(
                "running with an open pause",
            )),
            (false, None) => Err(MachineError::InconsistentAnchors(
                "paused without a pause instant",
            )),
            _ => Ok(()),
        }
    }
}

/// Elapsed-time accounting for a single machine.
///
/// There is no ticking timer: running and stop seconds are recomputed from the
/// anchor instants whenever [`MachineState::refresh`] is called.
/// `run_started_at` is fixed at the first start; pauses are subtracted through
/// `cumulative_stop_seconds` rather than by moving the anchor, so running time
/// is always "time since first start minus accumulated stoppage".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineState {
    identity: MachineIdentity,
    anchors: AccountingAnchors,
}

/// What a successful `start` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    Resumed { pause_seconds: u64 },
}

impl MachineState {
    pub fn new(identity: MachineIdentity) -> Self {
        Self {
            identity,
            anchors: AccountingAnchors::default(),
        }
    }

    pub fn from_anchors(
        identity: MachineIdentity,
        anchors: AccountingAnchors,
    ) -> Result<Self, MachineError> {
        anchors.validate()?;
        Ok(Self { identity, anchors })
    }

    pub fn identity(&self) -> &MachineIdentity {
        &self.identity
    }

    pub fn anchors(&self) -> &AccountingAnchors {
        &self.anchors
    }

    pub fn status(&self) -> MachineStatus {
        match (self.anchors.has_started, self.anchors.is_running) {
            (false, _) => MachineStatus::NotStarted,
            (true, true) => MachineStatus::Running,
            (true, false) => MachineStatus::Paused,
        }
    }

    pub fn is_running(&self) -> bool {
        self.anchors.is_running
    }

    pub fn has_started(&self) -> bool {
        self.anchors.has_started
    }

    pub fn run_started_at(&self) -> Option<DateTime<Utc>> {
        self.anchors.run_started_at
    }

    pub fn last_paused_at(&self) -> Option<DateTime<Utc>> {
        self.anchors.last_paused_at
    }

    pub fn cumulative_stop_seconds(&self) -> u64 {
        self.anchors.cumulative_stop_seconds
    }

    pub fn running_seconds(&self) -> u64 {
        self.anchors.running_seconds
    }

    pub fn stop_seconds(&self) -> u64 {
        self.anchors.stop_seconds
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<StartOutcome, MachineError> {
        match self.status() {
            MachineStatus::Running => Err(MachineError::AlreadyRunning),
            MachineStatus::NotStarted => {
                self.anchors.run_started_at = Some(now);
                self.anchors.has_started = true;
                self.anchors.is_running = true;
                self.anchors.stop_seconds = self.anchors.cumulative_stop_seconds;
                Ok(StartOutcome::Started)
            }
            MachineStatus::Paused => {
                let paused_at = self.anchors.last_paused_at.ok_or(
                    MachineError::InconsistentAnchors("paused without a pause instant"),
                )?;
                let pause_seconds = whole_seconds_between(paused_at, now, "pause duration")?;

                self.anchors.cumulative_stop_seconds += pause_seconds;
                self.anchors.last_paused_at = None;
                self.anchors.is_running = true;
                // running_seconds stays at its paused value until the next refresh.
                self.anchors.stop_seconds = self.anchors.cumulative_stop_seconds;
                Ok(StartOutcome::Resumed { pause_seconds })
            }
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), MachineError> {
        if !self.anchors.is_running {
            return Err(MachineError::AlreadyPaused);
        }

        let running_seconds = self.running_seconds_at(now)?;

        self.anchors.running_seconds = running_seconds;
        self.anchors.stop_seconds = self.anchors.cumulative_stop_seconds;
        self.anchors.is_running = false;
        self.anchors.last_paused_at = Some(now);
        Ok(())
    }

    /// Back to `NotStarted`. The identity is kept.
    pub fn reset(&mut self) {
        self.anchors = AccountingAnchors::default();
    }

    /// Recompute running and stop seconds for `now`.
    ///
    /// Running seconds only move while running; a paused machine keeps the
    /// value frozen at the pause instant and only its stop seconds grow.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Result<(), MachineError> {
        if !self.anchors.has_started {
            return Ok(());
        }

        if self.anchors.is_running {
            let running_seconds = self.running_seconds_at(now)?;
            self.anchors.running_seconds = running_seconds;
            self.anchors.stop_seconds = self.anchors.cumulative_stop_seconds;
        } else if let Some(paused_at) = self.anchors.last_paused_at {
            let current_stop = whole_seconds_between(paused_at, now, "current stop duration")?;
            self.anchors.stop_seconds = self.anchors.cumulative_stop_seconds + current_stop;
        }

        Ok(())
    }

    fn running_seconds_at(&self, now: DateTime<Utc>) -> Result<u64, MachineError> {
        let run_started_at = self.anchors.run_started_at.ok_or(
            MachineError::InconsistentAnchors("started without a start instant"),
        )?;
        let since_start = whole_seconds_between(run_started_at, now, "time since first start")?;

        since_start
            .checked_sub(self.anchors.cumulative_stop_seconds)
            .ok_or_else(|| MachineError::ClockAnomaly {
                what: "running time",
                delta_ms: (since_start as i64 - self.anchors.cumulative_stop_seconds as i64)
                    * 1000,
            })
    }
}

/// Floor of `to - from` in whole seconds.
fn whole_seconds_between(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    what: &'static str,
) -> Result<u64, MachineError> {
    let delta_ms = (to - from).num_milliseconds();
    if delta_ms < 0 {
        return Err(MachineError::ClockAnomaly { what, delta_ms });
    }
    Ok((delta_ms / 1000) as u64)
}
