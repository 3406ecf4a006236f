pub mod production;

pub use production::{efficiency_percent, ProductionRecord};
