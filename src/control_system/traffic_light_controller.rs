use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::shared_data::lock;
use crate::simulation_engine::errors::{CrossroadError, Result};

/// The signal shown to every approach of the crossroad.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalPhase {
    #[default]
    Red,
    Green,
    Yellow,
}

impl SignalPhase {
    /// Phase after a periodic cycle tick, or `None` when the tick does nothing.
    ///
    /// A tick landing on Yellow is ignored: the yellow one-shot owns that transition.
    pub fn on_cycle_tick(self) -> Option<SignalPhase> {
        match self {
            SignalPhase::Red => Some(SignalPhase::Green),
            SignalPhase::Green => Some(SignalPhase::Yellow),
            SignalPhase::Yellow => None,
        }
    }
}

impl fmt::Display for SignalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalPhase::Red => "RED",
            SignalPhase::Green => "GREEN",
            SignalPhase::Yellow => "YELLOW",
        };
        f.write_str(s)
    }
}

/// Callback run on the timer thread after every phase switch.
pub type PhaseListener = Box<dyn Fn(SignalPhase) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    CycleTick,
    YellowElapsed,
}

#[derive(Debug, Default)]
struct Schedule {
    started: bool,
    stopped: bool,
    next_tick: Option<Instant>,
    yellow_deadline: Option<Instant>,
}

struct TimerShared {
    phase: Mutex<SignalPhase>,
    schedule: Mutex<Schedule>,
    wake: Condvar,
    listeners: Mutex<Vec<PhaseListener>>,
}

impl TimerShared {
    fn notify(&self, phase: SignalPhase) {
        let listeners = lock(&self.listeners);
        for listener in listeners.iter() {
            listener(phase);
        }
    }
}

/// Free-running RED -> GREEN -> YELLOW -> RED signal.
///
/// A background thread fires a cycle tick immediately on `start` and then every
/// `green + yellow`. Turning GREEN into YELLOW also arms a one-shot that turns
/// the light RED after `yellow`. Only that thread ever writes the phase.
pub struct SignalTimer {
    green: Duration,
    yellow: Duration,
    shared: Arc<TimerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SignalTimer {
    /// Creates a stopped timer showing RED.
    pub fn new(green: Duration, yellow: Duration) -> Self {
        Self {
            green,
            yellow,
            shared: Arc::new(TimerShared {
                phase: Mutex::new(SignalPhase::Red),
                schedule: Mutex::new(Schedule::default()),
                wake: Condvar::new(),
                listeners: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Time between two cycle ticks.
    pub fn period(&self) -> Duration {
        self.green + self.yellow
    }

    /// Registers a callback for phase switches. Must not call `subscribe` itself.
    pub fn subscribe(&self, listener: PhaseListener) {
        lock(&self.shared.listeners).push(listener);
    }

    pub fn current_phase(&self) -> SignalPhase {
        *lock(&self.shared.phase)
    }

    pub fn is_running(&self) -> bool {
        let schedule = lock(&self.shared.schedule);
        schedule.started && !schedule.stopped
    }

    /// Starts the cycle. A timer can be started once, and only with a non-zero period.
    pub fn start(&self) -> Result<()> {
        if self.period().is_zero() {
            return Err(CrossroadError::InvalidConfig(
                "signal period (green + yellow) must be greater than zero".to_string(),
            ));
        }
        let mut worker = lock(&self.worker);
        {
            let mut schedule = lock(&self.shared.schedule);
            if schedule.started {
                return Err(CrossroadError::TimerAlreadyStarted);
            }
            schedule.started = true;
            schedule.next_tick = Some(Instant::now());
        }

        let shared = Arc::clone(&self.shared);
        let (period, yellow) = (self.period(), self.yellow);
        let handle = thread::Builder::new()
            .name("signal-timer".to_string())
            .spawn(move || run_schedule(shared, period, yellow))?;
        *worker = Some(handle);

        log::info!(
            "Traffic light started (green {:?}, yellow {:?})",
            self.green,
            self.yellow
        );
        Ok(())
    }

    /// Cancels every pending transition. Safe to call at any time, any number of times.
    ///
    /// When called from outside the timer thread, returns only after the thread
    /// has exited, so no transition happens afterwards.
    pub fn stop(&self) {
        {
            let mut schedule = lock(&self.shared.schedule);
            if !schedule.started || schedule.stopped {
                return;
            }
            schedule.stopped = true;
            schedule.next_tick = None;
            schedule.yellow_deadline = None;
        }
        self.shared.wake.notify_all();

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::warn!("Signal timer thread panicked");
            }
        }
        log::info!("Traffic light stopped at {}", self.current_phase());
    }
}

impl Drop for SignalTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_schedule(shared: Arc<TimerShared>, period: Duration, yellow: Duration) {
    let mut schedule = lock(&shared.schedule);
    loop {
        if schedule.stopped {
            break;
        }
        let Some(next_tick) = schedule.next_tick else {
            break;
        };
        let (due, event) = match schedule.yellow_deadline {
            Some(deadline) if deadline <= next_tick => (deadline, TimerEvent::YellowElapsed),
            _ => (next_tick, TimerEvent::CycleTick),
        };

        let now = Instant::now();
        if now < due {
            schedule = shared
                .wake
                .wait_timeout(schedule, due - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
            continue;
        }

        let switched = {
            let mut phase = lock(&shared.phase);
            let next = match event {
                TimerEvent::CycleTick => {
                    // fixed rate: the next tick is relative to this one, not to now
                    schedule.next_tick = Some(due + period);
                    phase.on_cycle_tick()
                }
                TimerEvent::YellowElapsed => {
                    schedule.yellow_deadline = None;
                    Some(SignalPhase::Red)
                }
            };
            if let Some(next) = next {
                if next == SignalPhase::Yellow {
                    schedule.yellow_deadline = Some(due + yellow);
                }
                *phase = next;
                log::info!("Traffic light switched to {}", next);
            }
            next
        };

        if let Some(phase) = switched {
            drop(schedule);
            shared.notify(phase);
            schedule = shared.schedule.lock().unwrap_or_else(PoisonError::into_inner);
        }
    }
    log::debug!("Signal timer thread exiting");
}
