use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("Production is already running")]
    AlreadyRunning,

    #[error("Production is already paused")]
    AlreadyPaused,

    /// A duration derived from the anchors came out negative. Either the wall
    /// clock stepped backwards or the anchor bookkeeping is broken.
    #[error("clock anomaly: {what} is negative ({delta_ms} ms)")]
    ClockAnomaly { what: &'static str, delta_ms: i64 },

    #[error("inconsistent accounting anchors: {0}")]
    InconsistentAnchors(&'static str),
}

impl MachineError {
    /// Rejected transitions leave state untouched and are the caller's fault.
    pub fn is_rejection(&self) -> bool {
        matches!(self, MachineError::AlreadyRunning | MachineError::AlreadyPaused)
    }
}
