//! Simulation pipeline module.

mod recorder;
mod simulator;
mod source;
mod stats;

pub use simulator::{Simulation, SimulationConfig};
pub use stats::SimulationStats;
