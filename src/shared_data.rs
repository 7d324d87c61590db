// src/shared_data.rs

use crate::control_system::traffic_light_controller::SignalPhase;
use crate::simulation_engine::directions::Trajectory;
use crate::simulation_engine::errors::Result;
use crate::simulation_engine::vehicles::CarId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Locks a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why a car is still held at its approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitReason {
    NotFirstInQueue,
    ConflictingDirections,
    SignalNotGreen,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaitReason::NotFirstInQueue => "is waiting because it's not first in the queue",
            WaitReason::ConflictingDirections => "is waiting due to conflicting directions",
            WaitReason::SignalNotGreen => "is waiting because the traffic light is not green",
        };
        f.write_str(s)
    }
}

/// Every state change the crossroad goes through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CrossroadEvent {
    Queued {
        car: CarId,
        trajectory: Trajectory,
    },
    Waiting {
        car: CarId,
        trajectory: Trajectory,
        reason: WaitReason,
    },
    Granted {
        car: CarId,
        trajectory: Trajectory,
        waited_ms: u64,
    },
    Left {
        car: CarId,
        trajectory: Trajectory,
    },
    Cancelled {
        car: CarId,
        trajectory: Trajectory,
    },
    PhaseSwitched {
        phase: SignalPhase,
    },
}

impl CrossroadEvent {
    pub fn car(&self) -> Option<CarId> {
        match self {
            CrossroadEvent::Queued { car, .. }
            | CrossroadEvent::Waiting { car, .. }
            | CrossroadEvent::Granted { car, .. }
            | CrossroadEvent::Left { car, .. }
            | CrossroadEvent::Cancelled { car, .. } => Some(*car),
            CrossroadEvent::PhaseSwitched { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Milliseconds since the log was created
    pub elapsed_ms: u64,
    pub event: CrossroadEvent,
}

/// Flat CSV row for an `EventRecord`
#[derive(Debug, Serialize, Deserialize)]
pub struct EventRow {
    pub elapsed_ms: u64,
    pub kind: String,
    pub car: Option<u64>,
    pub trajectory: Option<String>,
    pub detail: Option<String>,
}

impl From<&EventRecord> for EventRow {
    fn from(record: &EventRecord) -> Self {
        let (kind, trajectory, detail) = match &record.event {
            CrossroadEvent::Queued { trajectory, .. } => ("queued", Some(trajectory), None),
            CrossroadEvent::Waiting {
                trajectory, reason, ..
            } => ("waiting", Some(trajectory), Some(format!("{:?}", reason))),
            CrossroadEvent::Granted {
                trajectory,
                waited_ms,
                ..
            } => ("granted", Some(trajectory), Some(format!("waited {}ms", waited_ms))),
            CrossroadEvent::Left { trajectory, .. } => ("left", Some(trajectory), None),
            CrossroadEvent::Cancelled { trajectory, .. } => ("cancelled", Some(trajectory), None),
            CrossroadEvent::PhaseSwitched { phase } => ("phase", None, Some(phase.to_string())),
        };
        EventRow {
            elapsed_ms: record.elapsed_ms,
            kind: kind.to_string(),
            car: record.event.car().map(|c| c.0),
            trajectory: trajectory.map(|t| t.to_string()),
            detail,
        }
    }
}

/// Shared trace of crossroad events. Cloning shares the same log.
#[derive(Debug, Clone)]
pub struct EventLog {
    started: Instant,
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, event: CrossroadEvent) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        lock(&self.records).push(EventRecord { elapsed_ms, event });
    }

    /// Copy of everything recorded so far, in recording order.
    pub fn records(&self) -> Vec<EventRecord> {
        lock(&self.records).clone()
    }

    pub fn events(&self) -> Vec<CrossroadEvent> {
        lock(&self.records).iter().map(|r| r.event.clone()).collect()
    }

    /// Drops every record; later records keep their offset from creation.
    pub fn clear(&self) {
        lock(&self.records).clear();
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for record in self.records().iter() {
            wtr.serialize(EventRow::from(record))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

/// Summary of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub cars_finished: usize,
    pub cars_cancelled: usize,
    pub duration_ms: u64,
    pub average_wait_ms: f64,
    pub max_wait_ms: u64,
    /// Largest number of trajectories in flight at once
    pub max_concurrent: usize,
    pub phase_switches: usize,
}

impl SimulationReport {
    pub fn from_records(records: &[EventRecord], duration: Duration) -> Self {
        let mut cars_finished = 0;
        let mut cars_cancelled = 0;
        let mut waits = Vec::new();
        let mut in_flight: usize = 0;
        let mut max_concurrent = 0;
        let mut phase_switches = 0;

        for record in records {
            match &record.event {
                CrossroadEvent::Granted { waited_ms, .. } => {
                    waits.push(*waited_ms);
                    in_flight += 1;
                    max_concurrent = max_concurrent.max(in_flight);
                }
                CrossroadEvent::Left { .. } => {
                    cars_finished += 1;
                    in_flight = in_flight.saturating_sub(1);
                }
                CrossroadEvent::Cancelled { .. } => cars_cancelled += 1,
                CrossroadEvent::PhaseSwitched { .. } => phase_switches += 1,
                CrossroadEvent::Queued { .. } | CrossroadEvent::Waiting { .. } => {}
            }
        }

        let average_wait_ms = if waits.is_empty() {
            0.0
        } else {
            waits.iter().sum::<u64>() as f64 / waits.len() as f64
        };

        Self {
            cars_finished,
            cars_cancelled,
            duration_ms: duration.as_millis() as u64,
            average_wait_ms,
            max_wait_ms: waits.iter().copied().max().unwrap_or(0),
            max_concurrent,
            phase_switches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Trajectory {
        s.parse().unwrap()
    }

    #[test]
    fn test_report_counts_concurrency_and_waits() {
        let log = EventLog::new();
        log.record(CrossroadEvent::PhaseSwitched {
            phase: SignalPhase::Green,
        });
        log.record(CrossroadEvent::Granted {
            car: CarId(1),
            trajectory: t("N:W"),
            waited_ms: 10,
        });
        log.record(CrossroadEvent::Granted {
            car: CarId(2),
            trajectory: t("E:N"),
            waited_ms: 30,
        });
        log.record(CrossroadEvent::Left {
            car: CarId(1),
            trajectory: t("N:W"),
        });
        log.record(CrossroadEvent::Left {
            car: CarId(2),
            trajectory: t("E:N"),
        });

        let report = SimulationReport::from_records(&log.records(), Duration::from_millis(100));
        assert_eq!(report.cars_finished, 2);
        assert_eq!(report.max_concurrent, 2);
        assert_eq!(report.max_wait_ms, 30);
        assert_eq!(report.average_wait_ms, 20.0);
        assert_eq!(report.phase_switches, 1);
        assert_eq!(report.duration_ms, 100);
    }

    #[test]
    fn test_csv_export() {
        let log = EventLog::new();
        log.record(CrossroadEvent::Waiting {
            car: CarId(3),
            trajectory: t("S:N"),
            reason: WaitReason::SignalNotGreen,
        });
        log.record(CrossroadEvent::PhaseSwitched {
            phase: SignalPhase::Yellow,
        });

        let mut out = Vec::new();
        log.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "elapsed_ms,kind,car,trajectory,detail");
        assert!(lines[1].ends_with(",waiting,3,S->N,SignalNotGreen"));
        assert!(lines[2].ends_with(",phase,,,YELLOW"));
    }

    #[test]
    fn test_wait_reason_messages() {
        assert_eq!(
            WaitReason::ConflictingDirections.to_string(),
            "is waiting due to conflicting directions"
        );
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let event = CrossroadEvent::Left {
            car: CarId(9),
            trajectory: t("W:E"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "Left");
        assert_eq!(json["car"], 9);
    }
}
