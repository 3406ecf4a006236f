pub mod controller;
pub mod error;
pub mod state;

pub use controller::{MachineController, MachineSnapshot, ProductionReport};
pub use error::MachineError;
pub use state::{AccountingAnchors, MachineIdentity, MachineState, MachineStatus, StartOutcome};
