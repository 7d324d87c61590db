// simulation_engine/mod.rs
pub mod config;
pub mod directions;
pub mod errors;
pub mod intersection;
pub mod simulation;
pub mod vehicles;
