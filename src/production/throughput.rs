use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Units produced in one sampling period against what the line should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    pub actual_units: u64,
    pub expected_units: u64,
}

/// Where the sampler gets its counts from.
pub trait ThroughputSource: Send {
    fn measure(&mut self) -> Throughput;
}

/// Simulated counter: a uniform draw from `min..=max` per period.
#[derive(Debug, Clone)]
pub struct RandomThroughput {
    min_units: u64,
    max_units: u64,
    expected_units: u64,
    rng: StdRng,
}

impl RandomThroughput {
    pub fn new(min_units: u64, max_units: u64, expected_units: u64) -> Self {
        let (min_units, max_units) = if min_units <= max_units {
            (min_units, max_units)
        } else {
            (max_units, min_units)
        };
        Self {
            min_units,
            max_units,
            expected_units,
            rng: StdRng::from_entropy(),
        }
    }
}

impl ThroughputSource for RandomThroughput {
    fn measure(&mut self) -> Throughput {
        let actual_units = self.rng.gen_range(self.min_units..=self.max_units);
        Throughput {
            actual_units,
            expected_units: self.expected_units,
        }
    }
}

/// Replays a fixed sequence of actual counts, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedThroughput {
    actual: Vec<u64>,
    expected_units: u64,
    next: usize,
}

impl ScriptedThroughput {
    pub fn new(actual: Vec<u64>, expected_units: u64) -> Self {
        Self {
            actual,
            expected_units,
            next: 0,
        }
    }
}

impl ThroughputSource for ScriptedThroughput {
    fn measure(&mut self) -> Throughput {
        let actual_units = if self.actual.is_empty() {
            0
        } else {
            let value = self.actual[self.next % self.actual.len()];
            self.next += 1;
            value
        };
        Throughput {
            actual_units,
            expected_units: self.expected_units,
        }
    }
}
