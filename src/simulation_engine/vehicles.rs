use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;

use crate::simulation_engine::directions::{Direction, Trajectory};
use crate::simulation_engine::errors::Result;
use crate::simulation_engine::intersection::Crossroad;

/// Identity of a car at the crossroad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CarId(pub u64);

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A car that crosses once: arrive, hold the crossroad for `dwell`, leave.
#[derive(Debug, Clone)]
pub struct Car {
    pub id: CarId,
    pub trajectory: Trajectory,
    /// Time spent inside the crossroad once granted.
    pub dwell: Duration,
}

impl Car {
    pub fn new(id: u64, from: Direction, to: Direction, dwell: Duration) -> Result<Self> {
        Ok(Self {
            id: CarId(id),
            trajectory: Trajectory::new(from, to)?,
            dwell,
        })
    }

    /// Blocks the calling thread for the whole crossing.
    pub fn run(&self, crossroad: &Crossroad) -> Result<()> {
        let (from, to) = (self.trajectory.from(), self.trajectory.to());
        crossroad.enter(self.id, from, to)?;
        thread::sleep(self.dwell);
        crossroad.leave(self.id, from, to)
    }
}

/// The four cars of the classic demo: N->S, S->N, E->S, W->E.
pub fn demo_cars(dwell: Duration) -> Vec<Car> {
    // indexes into Trajectory::ALL
    [0, 6, 5, 9]
        .into_iter()
        .enumerate()
        .map(|(i, index)| Car {
            id: CarId(i as u64 + 1),
            trajectory: Trajectory::ALL[index],
            dwell,
        })
        .collect()
}

/// `count` cars on uniformly random trajectories, reproducible from `seed`.
pub fn random_cars(count: usize, seed: u64, dwell: Duration) -> Vec<Car> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| Car {
            id: CarId(i as u64 + 1),
            trajectory: Trajectory::ALL[rng.random_range(0..Trajectory::ALL.len())],
            dwell,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_u_turn() {
        assert!(Car::new(1, Direction::S, Direction::S, Duration::ZERO).is_err());
    }

    #[test]
    fn test_random_cars_are_reproducible() {
        let a = random_cars(20, 7, Duration::ZERO);
        let b = random_cars(20, 7, Duration::ZERO);
        let ta: Vec<Trajectory> = a.iter().map(|c| c.trajectory).collect();
        let tb: Vec<Trajectory> = b.iter().map(|c| c.trajectory).collect();
        assert_eq!(ta, tb);
        assert_eq!(a.last().unwrap().id, CarId(20));
    }

    #[test]
    fn test_demo_cars() {
        let cars = demo_cars(Duration::from_millis(5));
        let names: Vec<String> = cars.iter().map(|c| c.trajectory.to_string()).collect();
        assert_eq!(names, vec!["N->S", "S->N", "E->S", "W->E"]);
    }
}
