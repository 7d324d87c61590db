use thiserror::Error;

use crate::simulation_engine::directions::Direction;
use crate::simulation_engine::vehicles::CarId;

/// Errors surfaced by the crossroad, its signal timer and configuration.
#[derive(Debug, Error)]
pub enum CrossroadError {
    #[error("Invalid trajectory from {from} to {to}")]
    InvalidTrajectory { from: Direction, to: Direction },

    #[error("Car {0} is already queued at the crossroad")]
    DuplicateCar(CarId),

    #[error("Car {0} was cancelled while waiting")]
    Cancelled(CarId),

    #[error("Car {0} is not waiting to enter")]
    NotWaiting(CarId),

    #[error("Car {0} is not inside the crossroad")]
    NotInIntersection(CarId),

    #[error("Crossroad has been shut down")]
    Closed,

    #[error("Signal timer was already started")]
    TimerAlreadyStarted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, CrossroadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_trajectory_message() {
        let err = CrossroadError::InvalidTrajectory {
            from: Direction::N,
            to: Direction::N,
        };
        assert_eq!(err.to_string(), "Invalid trajectory from N to N");
    }

    #[test]
    fn test_cancelled_message() {
        let err = CrossroadError::Cancelled(CarId(7));
        assert_eq!(err.to_string(), "Car 7 was cancelled while waiting");
    }
}
