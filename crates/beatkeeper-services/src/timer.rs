//! Wall-clock repeating timers delivered over a channel

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use beatkeeper_core::{Scheduler, TimerId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

/// A timer firing, stamped with the scheduler time of its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub id: TimerId,
    pub at: Duration,
}

/// Scheduler backed by one sleeper thread per timer.
///
/// Firings arrive on the receiver returned by [`ThreadScheduler::new`]; the
/// owning thread dispatches them. Deadlines are `armed + n * period`, so
/// oversleeping on one firing does not push back the next. Clones share the
/// time origin, id space and event channel.
#[derive(Clone)]
pub struct ThreadScheduler {
    epoch: Instant,
    next_id: Arc<AtomicU64>,
    events: Sender<TimerEvent>,
    timers: Arc<Mutex<HashMap<TimerId, Arc<AtomicBool>>>>,
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.timers.lock().map(|t| t.len()).unwrap_or(0);
        f.debug_struct("ThreadScheduler").field("active", &active).finish()
    }
}

impl ThreadScheduler {
    pub fn new() -> (Self, Receiver<TimerEvent>) {
        let (tx, rx) = unbounded();
        let scheduler = Self {
            epoch: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
            events: tx,
            timers: Arc::new(Mutex::new(HashMap::new())),
        };
        (scheduler, rx)
    }

    fn run_timer(
        id: TimerId,
        epoch: Instant,
        period: Duration,
        cancelled: Arc<AtomicBool>,
        events: Sender<TimerEvent>,
    ) {
        let armed = Instant::now();
        let mut n: u32 = 1;

        loop {
            let deadline = armed + period * n;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }

            if cancelled.load(Ordering::SeqCst) {
                break;
            }

            let event = TimerEvent { id, at: deadline - epoch };
            if events.send(event).is_err() {
                break;
            }

            // Skip deadlines already missed rather than firing a burst
            let elapsed = Instant::now().saturating_duration_since(armed);
            let due = (elapsed.as_nanos() / period.as_nanos().max(1)) as u32;
            if due > n {
                warn!(?id, skipped = due - n, "Timer fell behind");
            }
            n = n.max(due) + 1;
        }

        debug!(?id, "Timer thread exiting");
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_repeating(&mut self, period: Duration) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let cancelled = Arc::new(AtomicBool::new(false));

        if let Ok(mut timers) = self.timers.lock() {
            timers.insert(id, cancelled.clone());
        }

        let epoch = self.epoch;
        let events = self.events.clone();
        let period = period.max(Duration::from_millis(1));
        thread::spawn(move || Self::run_timer(id, epoch, period, cancelled, events));

        id
    }

    fn cancel(&mut self, id: TimerId) {
        let flag = self.timers.lock().ok().and_then(|mut timers| timers.remove(&id));
        if let Some(flag) = flag {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_repeatedly() {
        let (mut sched, rx) = ThreadScheduler::new();
        let id = sched.schedule_repeating(Duration::from_millis(10));

        let mut last = Duration::ZERO;
        for _ in 0..3 {
            let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(event.id, id);
            assert!(event.at > last);
            last = event.at;
        }
        sched.cancel(id);
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let (mut sched, rx) = ThreadScheduler::new();
        let id = sched.schedule_repeating(Duration::from_millis(5));
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        sched.cancel(id);
        thread::sleep(Duration::from_millis(30));
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_clones_share_id_space() {
        let (mut a, _rx) = ThreadScheduler::new();
        let mut b = a.clone();
        let first = a.schedule_repeating(Duration::from_secs(60));
        let second = b.schedule_repeating(Duration::from_secs(60));
        assert_ne!(first, second);
        a.cancel(first);
        b.cancel(second);
    }
}
