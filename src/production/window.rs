use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_CAPACITY: usize = 60;

/// One throughput measurement for a sampling period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    /// Local time of day the sample was taken, for display.
    pub label: String,
    pub actual_units: u64,
    pub expected_units: u64,
    pub recorded_at: DateTime<Utc>,
}

impl SampleRecord {
    pub fn new(
        label: String,
        actual_units: u64,
        expected_units: u64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            label,
            actual_units,
            expected_units,
            recorded_at,
        }
    }

    /// Placeholder for a period in which the machine was stopped.
    pub fn idle(label: String, recorded_at: DateTime<Utc>) -> Self {
        Self::new(label, 0, 0, recorded_at)
    }
}

/// Most recent samples, oldest first, bounded by `capacity`.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<SampleRecord>,
    capacity: usize,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a sample, returning the evicted head if the window was full.
    pub fn record(&mut self, sample: SampleRecord) -> Option<SampleRecord> {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front()
        } else {
            None
        }
    }

    /// `(sum of actual units, sum of expected units)` over the held samples.
    pub fn aggregate(&self) -> (u64, u64) {
        self.samples.iter().fold((0, 0), |(actual, expected), sample| {
            (actual + sample.actual_units, expected + sample.expected_units)
        })
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleRecord> {
        self.samples.iter()
    }

    pub fn snapshot(&self) -> Vec<SampleRecord> {
        self.samples.iter().cloned().collect()
    }
}
