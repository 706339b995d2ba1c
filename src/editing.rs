//! Per-row editing flags.
//!
//! A row is editing while one of its inputs has focus, while a reserve or
//! release request for it is in flight, and for a short grace period after
//! blur. The renderer leaves the row's input/action region untouched while the
//! flag is set.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::timer::{TimerId, TimerWheel};

pub const DEFAULT_BLUR_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Clone, Copy)]
struct EditState {
    focused: bool,
    in_flight: u32,
    release: Option<TimerId>,
}

impl EditState {
    fn is_set(&self) -> bool {
        self.focused || self.in_flight > 0 || self.release.is_some()
    }
}

#[derive(Debug)]
pub struct EditingFlags {
    rows: HashMap<String, EditState>,
    timers: TimerWheel<String>,
    blur_grace: Duration,
}

impl Default for EditingFlags {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_GRACE)
    }
}

impl EditingFlags {
    pub fn new(blur_grace: Duration) -> Self {
        Self {
            rows: HashMap::new(),
            timers: TimerWheel::new(),
            blur_grace,
        }
    }

    pub fn is_editing(&self, device_id: &str) -> bool {
        self.rows.get(device_id).map(EditState::is_set).unwrap_or(false)
    }

    pub fn focus(&mut self, device_id: &str) {
        let state = self.rows.entry(device_id.to_string()).or_default();
        if let Some(timer) = state.release.take() {
            self.timers.cancel(timer);
        }
        state.focused = true;
    }

    /// Keeps the flag up for the grace period so a click that blurs an input
    /// can still reach the row's button.
    pub fn blur(&mut self, device_id: &str, now: Instant) {
        let Some(state) = self.rows.get_mut(device_id) else {
            return;
        };
        if !state.focused {
            return;
        }
        state.focused = false;
        if let Some(timer) = state.release.take() {
            self.timers.cancel(timer);
        }
        state.release = Some(
            self.timers
                .schedule_after(now, self.blur_grace, device_id.to_string()),
        );
    }

    pub fn begin_action(&mut self, device_id: &str) {
        self.rows.entry(device_id.to_string()).or_default().in_flight += 1;
    }

    pub fn end_action(&mut self, device_id: &str) {
        if let Some(state) = self.rows.get_mut(device_id) {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.prune(device_id);
    }

    /// Releases expired blur grace periods. Returns rows whose flag dropped.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut cleared = Vec::new();
        for (timer, device_id) in self.timers.expired(now) {
            if let Some(state) = self.rows.get_mut(&device_id) {
                if state.release == Some(timer) {
                    state.release = None;
                }
            }
            if !self.is_editing(&device_id) {
                cleared.push(device_id.clone());
            }
            self.prune(&device_id);
        }
        cleared
    }

    pub fn remove(&mut self, device_id: &str) {
        if let Some(state) = self.rows.remove(device_id) {
            if let Some(timer) = state.release {
                self.timers.cancel(timer);
            }
        }
    }

    pub fn retain(&mut self, keep: &HashSet<&str>) {
        let gone: Vec<String> = self
            .rows
            .keys()
            .filter(|id| !keep.contains(id.as_str()))
            .cloned()
            .collect();
        for id in gone {
            self.remove(&id);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn prune(&mut self, device_id: &str) {
        if !self.is_editing(device_id) {
            self.rows.remove(device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_then_blur_holds_for_grace_period() {
        let t0 = Instant::now();
        let mut flags = EditingFlags::default();
        flags.focus("sw1");
        assert!(flags.is_editing("sw1"));

        flags.blur("sw1", t0);
        assert!(flags.is_editing("sw1"));
        assert!(flags.expire(t0 + Duration::from_millis(100)).is_empty());
        assert!(flags.is_editing("sw1"));

        assert_eq!(flags.expire(t0 + Duration::from_millis(200)), vec!["sw1".to_string()]);
        assert!(!flags.is_editing("sw1"));
    }

    #[test]
    fn refocus_cancels_pending_release() {
        let t0 = Instant::now();
        let mut flags = EditingFlags::default();
        flags.focus("sw1");
        flags.blur("sw1", t0);
        flags.focus("sw1");
        assert!(flags.expire(t0 + Duration::from_secs(1)).is_empty());
        assert!(flags.is_editing("sw1"));
        assert_eq!(flags.next_deadline(), None);
    }

    #[test]
    fn in_flight_action_outlives_blur() {
        let t0 = Instant::now();
        let mut flags = EditingFlags::default();
        flags.focus("sw1");
        flags.begin_action("sw1");
        flags.blur("sw1", t0);
        assert!(flags.expire(t0 + Duration::from_secs(1)).is_empty());
        assert!(flags.is_editing("sw1"));
        flags.end_action("sw1");
        assert!(!flags.is_editing("sw1"));
    }

    #[test]
    fn removal_drops_timer() {
        let t0 = Instant::now();
        let mut flags = EditingFlags::default();
        flags.focus("sw1");
        flags.blur("sw1", t0);
        flags.retain(&HashSet::new());
        assert!(!flags.is_editing("sw1"));
        assert_eq!(flags.next_deadline(), None);
    }
}
