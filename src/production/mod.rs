pub mod sampler;
pub mod throughput;
pub mod window;

pub use sampler::Sampler;
pub use throughput::{RandomThroughput, ScriptedThroughput, Throughput, ThroughputSource};
pub use window::{SampleRecord, SampleWindow, DEFAULT_WINDOW_CAPACITY};
