//! Cancellable one-shot timers keyed by an arbitrary value.
//!
//! Nothing here sleeps. Callers pass `now` in, ask for [`TimerWheel::next_deadline`]
//! to know how long to wait, and drain [`TimerWheel::expired`] when woken. Tests
//! drive it with synthetic instants.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct TimerWheel<K> {
    queue: BTreeMap<(Instant, u64), K>,
    deadlines: HashMap<u64, Instant>,
    next_id: u64,
}

impl<K> Default for TimerWheel<K> {
    fn default() -> Self {
        Self {
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<K> TimerWheel<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_after(&mut self, now: Instant, delay: Duration, key: K) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = now + delay;
        self.queue.insert((deadline, id), key);
        self.deadlines.insert(id, deadline);
        TimerId(id)
    }

    /// Returns the key if the timer was still pending.
    pub fn cancel(&mut self, timer: TimerId) -> Option<K> {
        let deadline = self.deadlines.remove(&timer.0)?;
        self.queue.remove(&(deadline, timer.0))
    }

    pub fn is_pending(&self, timer: TimerId) -> bool {
        self.deadlines.contains_key(&timer.0)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Removes and returns every timer due at or before `now`, earliest first.
    pub fn expired(&mut self, now: Instant) -> Vec<(TimerId, K)> {
        let mut fired = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            let (deadline, id) = *entry.key();
            if deadline > now {
                break;
            }
            let key = entry.remove();
            self.deadlines.remove(&id);
            fired.push((TimerId(id), key));
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending_keys(&self) -> impl Iterator<Item = &K> {
        self.queue.values()
    }
}
