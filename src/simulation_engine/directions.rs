use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::simulation_engine::errors::CrossroadError;

/// One of the four approaches of the crossroad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    N,
    E,
    S,
    W,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::N, Direction::E, Direction::S, Direction::W];

    /// Position of the direction in per-approach arrays.
    pub fn slot(self) -> usize {
        match self {
            Direction::N => 0,
            Direction::E => 1,
            Direction::S => 2,
            Direction::W => 3,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::N => "N",
            Direction::E => "E",
            Direction::S => "S",
            Direction::W => "W",
        };
        f.write_str(s)
    }
}

impl FromStr for Direction {
    type Err = CrossroadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" => Ok(Direction::N),
            "E" => Ok(Direction::E),
            "S" => Ok(Direction::S),
            "W" => Ok(Direction::W),
            other => Err(CrossroadError::Parse(format!("unknown direction '{}'", other))),
        }
    }
}

/// A path through the crossroad: enter from `from`, exit towards `to`.
///
/// Only the twelve pairs with `from != to` exist; `Trajectory::new` refuses the rest.
/// Serialized as `"N->S"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Trajectory {
    from: Direction,
    to: Direction,
}

impl Trajectory {
    /// All trajectories, in conflict-matrix order.
    pub const ALL: [Trajectory; 12] = [
        Trajectory { from: Direction::N, to: Direction::S },
        Trajectory { from: Direction::N, to: Direction::E },
        Trajectory { from: Direction::N, to: Direction::W },
        Trajectory { from: Direction::E, to: Direction::W },
        Trajectory { from: Direction::E, to: Direction::N },
        Trajectory { from: Direction::E, to: Direction::S },
        Trajectory { from: Direction::S, to: Direction::N },
        Trajectory { from: Direction::S, to: Direction::E },
        Trajectory { from: Direction::S, to: Direction::W },
        Trajectory { from: Direction::W, to: Direction::E },
        Trajectory { from: Direction::W, to: Direction::N },
        Trajectory { from: Direction::W, to: Direction::S },
    ];

    pub fn new(from: Direction, to: Direction) -> Result<Self, CrossroadError> {
        if from == to {
            return Err(CrossroadError::InvalidTrajectory { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> Direction {
        self.from
    }

    pub fn to(&self) -> Direction {
        self.to
    }

    /// Row/column of this trajectory in `CONFLICT_MATRIX`.
    pub fn index(&self) -> usize {
        use Direction::*;
        match (self.from, self.to) {
            (N, S) => 0,
            (N, E) => 1,
            (N, W) => 2,
            (E, W) => 3,
            (E, N) => 4,
            (E, S) => 5,
            (S, N) => 6,
            (S, E) => 7,
            (S, W) => 8,
            (W, E) => 9,
            (W, N) => 10,
            (W, S) => 11,
            // `new` never builds a same-direction pair
            (N, N) | (E, E) | (S, S) | (W, W) => unreachable!("trajectory with from == to"),
        }
    }

    /// Whether both trajectories can be driven at the same time without collision.
    pub fn conflicts_with(&self, other: &Trajectory) -> bool {
        conflicts(*self, *other)
    }

    /// True if the trajectory starts or ends at `direction`.
    pub fn touches(&self, direction: Direction) -> bool {
        self.from == direction || self.to == direction
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

impl FromStr for Trajectory {
    type Err = CrossroadError;

    /// Parses `"N:S"`, `"N->S"` or `"NS"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (from, to) = if let Some((a, b)) = s.split_once("->") {
            (a, b)
        } else if let Some((a, b)) = s.split_once(':') {
            (a, b)
        } else if s.len() == 2 && s.is_ascii() {
            s.split_at(1)
        } else {
            return Err(CrossroadError::Parse(format!("cannot parse trajectory '{}'", s)));
        };
        Trajectory::new(from.parse()?, to.parse()?)
    }
}

impl TryFrom<String> for Trajectory {
    type Error = CrossroadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Trajectory> for String {
    fn from(trajectory: Trajectory) -> Self {
        trajectory.to_string()
    }
}

/// Authored collision table, rows and columns in `Trajectory::ALL` order.
#[rustfmt::skip]
pub const CONFLICT_MATRIX: [[bool; 12]; 12] = [
    //        N->S   N->E   N->W   E->W   E->N   E->S   S->N   S->E   S->W   W->E   W->N   W->S
    /*N->S*/ [false, false, false, true,  false, false, false, false, true,  true,  true,  false],
    /*N->E*/ [false, false, false, true,  false, true,  true,  false, true,  false, false, false],
    /*N->W*/ [false, false, false, false, false, false, false, false, false, false, false, false],
    /*E->W*/ [true,  true,  false, false, false, false, true,  false, false, false, false, false],
    /*E->N*/ [false, false, false, false, false, false, false, false, false, false, false, false],
    /*E->S*/ [false, true,  false, false, false, false, true,  false, true,  true,  false, false],
    /*S->N*/ [false, true,  false, true,  false, true,  false, false, false, true,  false, false],
    /*S->E*/ [false, false, false, false, false, false, false, false, false, false, false, false],
    /*S->W*/ [true,  true,  false, false, false, true,  false, false, false, true,  true,  false],
    /*W->E*/ [true,  false, false, false, false, true,  true,  false, true,  false, false, false],
    /*W->N*/ [true,  true,  false, true,  false, true,  false, false, true,  false, false, false],
    /*W->S*/ [false, false, false, false, false, false, false, false, false, false, false, false],
];

/// Symmetric conflict lookup.
///
/// The table is not symmetric in every cell (e.g. W->N marks N->E but not the
/// other way round), so a pair conflicts when either row says so.
pub fn conflicts(a: Trajectory, b: Trajectory) -> bool {
    let (i, j) = (a.index(), b.index());
    CONFLICT_MATRIX[i][j] || CONFLICT_MATRIX[j][i]
}
