//! Four-way crossroad coordination: cars queue per approach and cross only
//! when they head their queue, their trajectory is clear, and the signal is GREEN.

pub mod control_system;
pub mod global_variables;
pub mod shared_data;
pub mod simulation_engine;

pub use control_system::traffic_light_controller::{SignalPhase, SignalTimer};
pub use shared_data::{CrossroadEvent, EventLog, SimulationReport, WaitReason};
pub use simulation_engine::config::{ConflictCheck, CrossroadConfig};
pub use simulation_engine::directions::{conflicts, Direction, Trajectory};
pub use simulation_engine::errors::{CrossroadError, Result};
pub use simulation_engine::intersection::{Crossroad, CrossroadSnapshot};
pub use simulation_engine::vehicles::{Car, CarId};
