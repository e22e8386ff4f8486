//! Game simulation modules

pub mod collision;
pub mod combat;
pub mod physics;
pub mod simulation;

pub use simulation::{Simulation, StepResult};
