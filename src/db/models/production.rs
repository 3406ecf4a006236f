//! Rows of the `production_data` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::machine::{MachineIdentity, MachineState};

/// `actual / expected * 100`, or 0 when nothing was expected.
pub fn efficiency_percent(actual_units: u64, expected_units: u64) -> f64 {
    if expected_units == 0 {
        0.0
    } else {
        actual_units as f64 * 100.0 / expected_units as f64
    }
}

/// A completed sample as written to the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductionRecord {
    pub id: String,
    pub machine_name: String,
    pub batch: String,
    pub batch_size: u32,
    pub product: String,
    pub start_time: Option<DateTime<Utc>>,
    pub running_seconds: u64,
    pub stop_seconds: u64,
    pub actual_units: u64,
    pub expected_units: u64,
    pub efficiency: f64,
    pub created_at: DateTime<Utc>,
}

impl ProductionRecord {
    /// Capture the machine's current totals alongside one sample.
    /// `machine` should have been refreshed at `created_at`.
    pub fn from_sample(
        machine: &MachineState,
        actual_units: u64,
        expected_units: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let MachineIdentity {
            machine_name,
            batch,
            batch_size,
            product,
        } = machine.identity().clone();

        Self {
            id: Uuid::new_v4().to_string(),
            machine_name,
            batch,
            batch_size,
            product,
            start_time: machine.run_started_at(),
            running_seconds: machine.running_seconds(),
            stop_seconds: machine.stop_seconds(),
            actual_units,
            expected_units,
            efficiency: efficiency_percent(actual_units, expected_units),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn efficiency_handles_zero_expected() {
        assert_eq!(efficiency_percent(15, 20), 75.0);
        assert_eq!(efficiency_percent(20, 20), 100.0);
        assert_eq!(efficiency_percent(5, 0), 0.0);
    }

    #[test]
    fn from_sample_copies_identity_and_totals() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let mut machine = MachineState::new(MachineIdentity::default());
        machine.start(start).unwrap();
        let now = start + Duration::seconds(50);
        machine.refresh(now).unwrap();

        let record = ProductionRecord::from_sample(&machine, 12, 20, now);
        assert_eq!(record.machine_name, "Ishida-aeZ4K88");
        assert_eq!(record.batch_size, 6000);
        assert_eq!(record.start_time, Some(start));
        assert_eq!(record.running_seconds, 50);
        assert_eq!(record.stop_seconds, 0);
        assert_eq!(record.efficiency, 60.0);
        assert!(Uuid::parse_str(&record.id).is_ok());
    }
}
