//! Repeating-timer abstraction and a virtual-time implementation

use std::time::Duration;

/// Handle of an armed repeating timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Source of repeating timers and of the current time.
///
/// Implementations never call back into their owner; the host delivers
/// firings by calling the owner's `on_timer` with the `TimerId`.
pub trait Scheduler {
    /// Arm a timer that first fires one `period` from now, then every `period`
    fn schedule_repeating(&mut self, period: Duration) -> TimerId;
    /// Disarm a timer. Unknown ids are ignored.
    fn cancel(&mut self, id: TimerId);
    /// Time since the scheduler's origin
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone)]
struct ManualTimer {
    id: TimerId,
    armed_at: Duration,
    period: Duration,
    fired: u32,
}

impl ManualTimer {
    fn next_deadline(&self) -> Duration {
        self.armed_at + self.period * (self.fired + 1)
    }
}

/// Scheduler driven by explicit time steps, for tests and offline rendering
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    timers: Vec<ManualTimer>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    /// Pop the earliest timer due at or before `until`, moving `now` to its
    /// deadline. Returns `None` (and moves `now` to `until`) when nothing is due.
    pub fn pop_due(&mut self, until: Duration) -> Option<TimerId> {
        let due = self
            .timers
            .iter_mut()
            .filter(|t| t.next_deadline() <= until)
            .min_by_key(|t| (t.next_deadline(), t.id));

        match due {
            Some(timer) => {
                self.now = timer.next_deadline();
                timer.fired += 1;
                Some(timer.id)
            }
            None => {
                self.now = self.now.max(until);
                None
            }
        }
    }

    /// Move time forward without firing anything
    pub fn set_now(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&mut self, period: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.timers.push(ManualTimer {
            id,
            armed_at: self.now,
            period: period.max(Duration::from_micros(1)),
            fired: 0,
        });
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.timers.retain(|t| t.id != id);
    }

    fn now(&self) -> Duration {
        self.now
    }
}
