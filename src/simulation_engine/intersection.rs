use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

use crate::control_system::traffic_light_controller::{SignalPhase, SignalTimer};
use crate::shared_data::{lock, CrossroadEvent, EventLog, WaitReason};
use crate::simulation_engine::config::{ConflictCheck, CrossroadConfig};
use crate::simulation_engine::directions::{conflicts, Direction, Trajectory};
use crate::simulation_engine::errors::{CrossroadError, Result};
use crate::simulation_engine::vehicles::CarId;

/// Mutable state of the crossroad, guarded by a single mutex.
#[derive(Debug, Default)]
struct CrossroadState {
    /// Per-approach arrival order. A car stays at the head while it crosses.
    queues: [VecDeque<CarId>; 4],
    /// Trajectories currently being driven.
    in_flight: Vec<(CarId, Trajectory)>,
    /// Waiting cars asked to give up.
    cancelled: HashSet<CarId>,
    /// Last phase written to the event log.
    logged_phase: SignalPhase,
    closed: bool,
}

impl CrossroadState {
    fn is_occupied(&self, direction: Direction) -> bool {
        self.in_flight.iter().any(|(_, t)| t.touches(direction))
    }

    fn occupied(&self) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|d| self.is_occupied(*d))
            .collect()
    }

    fn is_queued(&self, car: CarId) -> bool {
        self.queues.iter().any(|q| q.contains(&car))
    }

    fn is_crossing(&self, car: CarId) -> bool {
        self.in_flight.iter().any(|(c, _)| *c == car)
    }

    fn approach_of(&self, car: CarId) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|d| self.queues[d.slot()].contains(&car))
    }

    fn path_is_clear(&self, trajectory: Trajectory, check: ConflictCheck) -> bool {
        match check {
            ConflictCheck::Trajectory => self
                .in_flight
                .iter()
                .all(|(_, active)| !conflicts(trajectory, *active)),
            ConflictCheck::DirectionPairs => {
                let occupied = self.occupied();
                for a in &occupied {
                    for b in &occupied {
                        if let Ok(pair) = Trajectory::new(*a, *b) {
                            if conflicts(trajectory, pair) {
                                return false;
                            }
                        }
                    }
                }
                true
            }
        }
    }

    /// First unmet entry condition, or `None` if the car may go.
    fn blocking_reason(
        &self,
        car: CarId,
        trajectory: Trajectory,
        phase: SignalPhase,
        check: ConflictCheck,
    ) -> Option<WaitReason> {
        if self.queues[trajectory.from().slot()].front() != Some(&car) {
            Some(WaitReason::NotFirstInQueue)
        } else if !self.path_is_clear(trajectory, check) {
            Some(WaitReason::ConflictingDirections)
        } else if phase != SignalPhase::Green {
            Some(WaitReason::SignalNotGreen)
        } else {
            None
        }
    }
}

struct CrossroadShared {
    state: Mutex<CrossroadState>,
    /// One condition per approach, indexed by `Direction::slot`.
    approaches: [Condvar; 4],
    events: EventLog,
}

impl CrossroadShared {
    /// Logs a phase switch once, whichever of the listener or a car sees it first.
    ///
    /// Called with the state lock held, so a grant is always logged after its GREEN.
    fn note_phase(&self, state: &mut CrossroadState, phase: SignalPhase) {
        if state.logged_phase != phase {
            state.logged_phase = phase;
            self.events.record(CrossroadEvent::PhaseSwitched { phase });
        }
    }

    /// Broadcast to every approach that has someone queued.
    fn wake_waiting_approaches(&self, state: &CrossroadState) {
        for direction in Direction::ALL {
            if !state.queues[direction.slot()].is_empty() {
                self.approaches[direction.slot()].notify_all();
            }
        }
    }
}

/// Point-in-time view of the crossroad, for tests and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossroadSnapshot {
    pub phase: SignalPhase,
    pub queues: BTreeMap<Direction, Vec<CarId>>,
    pub in_flight: Vec<(CarId, Trajectory)>,
    pub occupied: Vec<Direction>,
}

/// Four-way crossroad coordinator.
///
/// A car is let in once it heads its approach queue, its trajectory clears
/// everything in flight, and the signal is GREEN. All three are checked under
/// the same lock, so a grant never races a phase switch or a departure.
pub struct Crossroad {
    shared: Arc<CrossroadShared>,
    timer: Arc<SignalTimer>,
    conflict_check: ConflictCheck,
}

impl Crossroad {
    /// Builds a crossroad with its own signal timer and starts the timer.
    pub fn new(config: &CrossroadConfig) -> Result<Self> {
        config.validate()?;
        let timer = Arc::new(SignalTimer::new(config.green(), config.yellow()));
        let crossroad = Self::with_timer(Arc::clone(&timer), config.conflict_check);
        timer.start()?;
        Ok(crossroad)
    }

    /// Builds a crossroad around an existing timer. The timer is not started.
    pub fn with_timer(timer: Arc<SignalTimer>, conflict_check: ConflictCheck) -> Self {
        let shared = Arc::new(CrossroadShared {
            state: Mutex::new(CrossroadState {
                logged_phase: timer.current_phase(),
                ..CrossroadState::default()
            }),
            approaches: Default::default(),
            events: EventLog::new(),
        });

        let listener_shared = Arc::clone(&shared);
        timer.subscribe(Box::new(move |phase| {
            let mut state = lock(&listener_shared.state);
            listener_shared.note_phase(&mut state, phase);
            if phase == SignalPhase::Green {
                listener_shared.wake_waiting_approaches(&state);
            }
        }));

        Self {
            shared,
            timer,
            conflict_check,
        }
    }

    pub fn timer(&self) -> &Arc<SignalTimer> {
        &self.timer
    }

    pub fn events(&self) -> &EventLog {
        &self.shared.events
    }

    /// Queues `car` on `from` and blocks until it may cross towards `to`.
    ///
    /// On return both directions are occupied by the car until `leave`.
    pub fn enter(&self, car: CarId, from: Direction, to: Direction) -> Result<Trajectory> {
        let trajectory = Trajectory::new(from, to)?;
        let slot = from.slot();

        let mut state = lock(&self.shared.state);
        if state.closed {
            return Err(CrossroadError::Closed);
        }
        if state.is_queued(car) {
            return Err(CrossroadError::DuplicateCar(car));
        }
        state.queues[slot].push_back(car);
        self.shared
            .events
            .record(CrossroadEvent::Queued { car, trajectory });
        log::debug!("Car {} queued at {} heading {}", car, from, to);

        let arrived = Instant::now();
        let mut last_reason = None;
        loop {
            if state.cancelled.remove(&car) {
                state.queues[slot].retain(|c| *c != car);
                self.shared.wake_waiting_approaches(&state);
                self.shared
                    .events
                    .record(CrossroadEvent::Cancelled { car, trajectory });
                log::warn!("Car {} from {} to {} gave up waiting", car, from, to);
                return Err(CrossroadError::Cancelled(car));
            }

            let phase = self.timer.current_phase();
            self.shared.note_phase(&mut state, phase);
            let Some(reason) = state.blocking_reason(car, trajectory, phase, self.conflict_check)
            else {
                break;
            };
            if last_reason != Some(reason) {
                log::debug!("Car {} from {} to {} {}", car, from, to, reason);
                self.shared.events.record(CrossroadEvent::Waiting {
                    car,
                    trajectory,
                    reason,
                });
                last_reason = Some(reason);
            }
            state = self.shared.approaches[slot]
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        debug_assert!(
            state
                .in_flight
                .iter()
                .all(|(_, active)| !conflicts(trajectory, *active)),
            "granting {} would collide with {:?}",
            trajectory,
            state.in_flight
        );
        state.in_flight.push((car, trajectory));

        let waited_ms = arrived.elapsed().as_millis() as u64;
        self.shared.events.record(CrossroadEvent::Granted {
            car,
            trajectory,
            waited_ms,
        });
        log::info!("Car {} moving from {} to {}", car, from, to);
        Ok(trajectory)
    }

    /// Releases the car's trajectory and wakes every approach with waiters.
    ///
    /// Must follow a successful `enter` with the same car and directions.
    pub fn leave(&self, car: CarId, from: Direction, to: Direction) -> Result<()> {
        let trajectory = Trajectory::new(from, to)?;
        let slot = from.slot();

        let mut state = lock(&self.shared.state);
        let position = state
            .in_flight
            .iter()
            .position(|(c, t)| *c == car && *t == trajectory);
        let Some(position) = position.filter(|_| state.queues[slot].front() == Some(&car)) else {
            log::warn!("Car {} tried to leave {} without entering", car, trajectory);
            return Err(CrossroadError::NotInIntersection(car));
        };

        state.queues[slot].pop_front();
        state.in_flight.swap_remove(position);
        self.shared
            .events
            .record(CrossroadEvent::Left { car, trajectory });
        log::info!("Car {} has left from {} to {}", car, from, to);

        self.shared.wake_waiting_approaches(&state);
        Ok(())
    }

    /// Makes a car blocked in `enter` give up. Its `enter` returns `Cancelled`.
    pub fn cancel(&self, car: CarId) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if state.is_crossing(car) {
            return Err(CrossroadError::NotWaiting(car));
        }
        let Some(approach) = state.approach_of(car) else {
            return Err(CrossroadError::NotWaiting(car));
        };
        state.cancelled.insert(car);
        self.shared.approaches[approach.slot()].notify_all();
        Ok(())
    }

    /// Stops the signal and cancels every car still waiting. Later `enter` calls fail.
    pub fn shutdown(&self) {
        self.timer.stop();

        let mut state = lock(&self.shared.state);
        if state.closed {
            return;
        }
        state.closed = true;
        let waiting: Vec<CarId> = state
            .queues
            .iter()
            .flatten()
            .copied()
            .filter(|c| !state.in_flight.iter().any(|(f, _)| f == c))
            .collect();
        for car in &waiting {
            state.cancelled.insert(*car);
        }
        for condvar in &self.shared.approaches {
            condvar.notify_all();
        }
        log::info!("Crossroad shut down ({} cars still waiting)", waiting.len());
    }

    pub fn is_occupied(&self, direction: Direction) -> bool {
        lock(&self.shared.state).is_occupied(direction)
    }

    pub fn snapshot(&self) -> CrossroadSnapshot {
        let state = lock(&self.shared.state);
        CrossroadSnapshot {
            phase: self.timer.current_phase(),
            queues: Direction::ALL
                .into_iter()
                .map(|d| (d, state.queues[d.slot()].iter().copied().collect()))
                .collect(),
            in_flight: state.in_flight.clone(),
            occupied: state.occupied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use Direction::*;

    fn t(s: &str) -> Trajectory {
        s.parse().unwrap()
    }

    /// A crossroad whose signal turns GREEN at once and stays GREEN for the test.
    fn green_crossroad(check: ConflictCheck) -> Crossroad {
        let timer = Arc::new(SignalTimer::new(Duration::from_secs(60), Duration::from_secs(1)));
        let crossroad = Crossroad::with_timer(Arc::clone(&timer), check);
        timer.start().unwrap();
        while timer.current_phase() != SignalPhase::Green {
            thread::sleep(Duration::from_millis(1));
        }
        crossroad
    }

    fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_blocking_reason_order() {
        let mut state = CrossroadState::default();
        state.queues[N.slot()].extend([CarId(1), CarId(2)]);
        state.in_flight.push((CarId(9), t("E:W")));

        let check = ConflictCheck::Trajectory;
        assert_eq!(
            state.blocking_reason(CarId(2), t("N:S"), SignalPhase::Green, check),
            Some(WaitReason::NotFirstInQueue)
        );
        assert_eq!(
            state.blocking_reason(CarId(1), t("N:S"), SignalPhase::Red, check),
            Some(WaitReason::ConflictingDirections)
        );
        assert_eq!(
            state.blocking_reason(CarId(1), t("N:W"), SignalPhase::Yellow, check),
            Some(WaitReason::SignalNotGreen)
        );
        assert_eq!(state.blocking_reason(CarId(1), t("N:W"), SignalPhase::Green, check), None);
    }

    #[test]
    fn test_direction_pairs_is_stricter() {
        let mut state = CrossroadState::default();
        // occupies N, W, E, S through two harmless right turns
        state.in_flight.push((CarId(1), t("N:W")));
        state.in_flight.push((CarId(2), t("S:E")));

        assert!(state.path_is_clear(t("E:N"), ConflictCheck::Trajectory));
        // E and W are both occupied, and E->W crosses S->N
        assert!(!state.path_is_clear(t("S:N"), ConflictCheck::DirectionPairs));
        assert!(state.path_is_clear(t("S:N"), ConflictCheck::Trajectory));
    }

    #[test]
    fn test_occupancy_follows_in_flight_set() {
        let mut state = CrossroadState::default();
        state.in_flight.push((CarId(1), t("N:W")));
        state.in_flight.push((CarId(2), t("E:N")));
        assert_eq!(state.occupied(), vec![N, E, W]);

        // N stays occupied while E->N is still crossing
        state.in_flight.retain(|(c, _)| *c != CarId(1));
        assert_eq!(state.occupied(), vec![N, E]);
    }

    #[test]
    fn test_enter_and_leave_round_trip() {
        let crossroad = green_crossroad(ConflictCheck::Trajectory);
        crossroad.enter(CarId(1), N, S).unwrap();
        assert!(crossroad.is_occupied(N));
        assert!(crossroad.is_occupied(S));
        assert_eq!(crossroad.snapshot().queues[&N], vec![CarId(1)]);

        crossroad.leave(CarId(1), N, S).unwrap();
        let snapshot = crossroad.snapshot();
        assert!(snapshot.occupied.is_empty());
        assert!(snapshot.queues[&N].is_empty());
        assert!(snapshot.in_flight.is_empty());
        crossroad.shutdown();
    }

    #[test]
    fn test_invalid_trajectory_is_not_queued() {
        let crossroad = green_crossroad(ConflictCheck::Trajectory);
        let err = crossroad.enter(CarId(1), E, E).unwrap_err();
        assert!(matches!(err, CrossroadError::InvalidTrajectory { .. }));
        assert!(crossroad.snapshot().queues[&E].is_empty());
        assert!(!crossroad
            .events()
            .events()
            .iter()
            .any(|e| matches!(e, CrossroadEvent::Queued { .. })));
        crossroad.shutdown();
    }

    #[test]
    fn test_duplicate_car_rejected() {
        let crossroad = green_crossroad(ConflictCheck::Trajectory);
        crossroad.enter(CarId(1), N, W).unwrap();
        assert!(matches!(
            crossroad.enter(CarId(1), S, N),
            Err(CrossroadError::DuplicateCar(CarId(1)))
        ));
        crossroad.leave(CarId(1), N, W).unwrap();
        crossroad.shutdown();
    }

    #[test]
    fn test_leave_without_enter_is_reported() {
        let crossroad = green_crossroad(ConflictCheck::Trajectory);
        assert!(matches!(
            crossroad.leave(CarId(4), W, E),
            Err(CrossroadError::NotInIntersection(CarId(4)))
        ));
        crossroad.enter(CarId(5), W, E).unwrap();
        // wrong trajectory for this car
        assert!(crossroad.leave(CarId(5), W, N).is_err());
        crossroad.leave(CarId(5), W, E).unwrap();
        crossroad.shutdown();
    }

    #[test]
    fn test_cancel_removes_waiter_from_queue() {
        let crossroad = Arc::new(green_crossroad(ConflictCheck::Trajectory));
        crossroad.enter(CarId(1), N, S).unwrap();

        let waiter = {
            let crossroad = Arc::clone(&crossroad);
            thread::spawn(move || crossroad.enter(CarId(2), N, E))
        };
        wait_until(|| crossroad.snapshot().queues[&N].len() == 2);

        assert!(matches!(crossroad.cancel(CarId(1)), Err(CrossroadError::NotWaiting(_))));
        crossroad.cancel(CarId(2)).unwrap();
        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(CrossroadError::Cancelled(CarId(2)))));
        assert_eq!(crossroad.snapshot().queues[&N], vec![CarId(1)]);

        crossroad.leave(CarId(1), N, S).unwrap();
        crossroad.shutdown();
    }

    #[test]
    fn test_grant_is_logged_after_its_green() {
        let timer = Arc::new(SignalTimer::new(Duration::from_secs(60), Duration::from_secs(1)));
        let crossroad = Crossroad::with_timer(Arc::clone(&timer), ConflictCheck::Trajectory);

        // the listener cannot log GREEN while the state is held
        let state = lock(&crossroad.shared.state);
        timer.start().unwrap();
        wait_until(|| timer.current_phase() == SignalPhase::Green);
        thread::sleep(Duration::from_millis(20));
        assert!(crossroad.events().events().is_empty());
        drop(state);

        crossroad.enter(CarId(1), N, S).unwrap();
        let events = crossroad.events().events();
        let green = CrossroadEvent::PhaseSwitched {
            phase: SignalPhase::Green,
        };
        assert_eq!(events.iter().filter(|e| **e == green).count(), 1);
        let switched = events.iter().position(|e| *e == green).unwrap();
        let granted = events
            .iter()
            .position(|e| matches!(e, CrossroadEvent::Granted { .. }))
            .unwrap();
        assert!(switched < granted);

        crossroad.leave(CarId(1), N, S).unwrap();
        crossroad.shutdown();
        let after = crossroad.events().events();
        assert_eq!(after.iter().filter(|e| **e == green).count(), 1);
    }

    #[test]
    fn test_shutdown_releases_waiters_and_closes() {
        let timer = Arc::new(SignalTimer::new(Duration::from_secs(60), Duration::from_secs(1)));
        // never started, so the light stays RED
        let crossroad = Arc::new(Crossroad::with_timer(timer, ConflictCheck::Trajectory));

        let waiter = {
            let crossroad = Arc::clone(&crossroad);
            thread::spawn(move || crossroad.enter(CarId(1), S, N))
        };
        wait_until(|| crossroad.snapshot().queues[&S].len() == 1);

        crossroad.shutdown();
        assert!(matches!(waiter.join().unwrap(), Err(CrossroadError::Cancelled(_))));
        assert!(matches!(crossroad.enter(CarId(2), E, W), Err(CrossroadError::Closed)));
    }
}
