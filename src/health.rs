//! Per-device connectivity checks with bounded retry.
//!
//! Every known device has exactly one of: a pending timer, an outstanding check,
//! or (after `max_retries` consecutive failures) nothing at all until a manual
//! recheck re-arms it. Results are matched to the check that produced them by a
//! [`PingTicket`]; anything stale is dropped.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::timer::{TimerId, TimerWheel};

pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct HealthPolicy {
    pub up_interval: Duration,
    pub retry_interval: Duration,
    pub max_retries: u32,
    /// Results older than this render as unknown
    pub stale_after: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            up_interval: Duration::from_secs(60),
            retry_interval: Duration::from_secs(5),
            max_retries: MAX_RETRIES,
            stale_after: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending(TimerId),
    Checking(u64),
    Silenced,
}

#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub up: Option<bool>,
    pub failures: u32,
    pub last_checked: Option<Instant>,
    phase: Phase,
}

impl HealthRecord {
    pub fn is_silenced(&self) -> bool {
        self.phase == Phase::Silenced
    }

    pub fn is_checking(&self) -> bool {
        matches!(self.phase, Phase::Checking(_))
    }
}

/// Identifies one check attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PingTicket {
    pub device_id: String,
    token: u64,
}

/// What the health cell should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthView {
    Unknown,
    Checking,
    Up,
    Down { failures: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Rescheduled(Duration),
    Silenced,
}

#[derive(Debug, Default)]
pub struct HealthScheduler {
    policy: HealthPolicy,
    records: HashMap<String, HealthRecord>,
    timers: TimerWheel<String>,
    next_token: u64,
}

impl HealthScheduler {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn record(&self, device_id: &str) -> Option<&HealthRecord> {
        self.records.get(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.records.contains_key(device_id)
    }

    /// Arms an immediate check for a device seen for the first time. Known
    /// devices, including silenced ones, are left alone. Returns whether a
    /// check was scheduled.
    pub fn ensure_polling(&mut self, device_id: &str, now: Instant) -> bool {
        if self.records.contains_key(device_id) {
            return false;
        }
        let timer = self
            .timers
            .schedule_after(now, Duration::ZERO, device_id.to_string());
        self.records.insert(
            device_id.to_string(),
            HealthRecord {
                up: None,
                failures: 0,
                last_checked: None,
                phase: Phase::Pending(timer),
            },
        );
        debug!(device_id, "health polling armed");
        true
    }

    /// Moves every device whose timer has expired into the checking phase and
    /// hands back the tickets to ping.
    pub fn due(&mut self, now: Instant) -> Vec<PingTicket> {
        let mut tickets = Vec::new();
        for (timer, device_id) in self.timers.expired(now) {
            let token = self.next_token;
            let Some(record) = self.records.get_mut(&device_id) else {
                continue;
            };
            if record.phase != Phase::Pending(timer) {
                continue;
            }
            self.next_token += 1;
            record.phase = Phase::Checking(token);
            tickets.push(PingTicket { device_id, token });
        }
        tickets
    }

    /// Resets the failure count, drops any pending timer and starts a check
    /// right away. `None` for devices we don't know.
    pub fn manual_recheck(&mut self, device_id: &str) -> Option<PingTicket> {
        let record = self.records.get_mut(device_id)?;
        if let Phase::Pending(timer) = record.phase {
            self.timers.cancel(timer);
        }
        let token = self.next_token;
        self.next_token += 1;
        record.failures = 0;
        record.up = None;
        record.phase = Phase::Checking(token);
        info!(device_id, "manual health recheck");
        Some(PingTicket {
            device_id: device_id.to_string(),
            token,
        })
    }

    /// Applies a check result. A failed request counts as down. Results for
    /// removed devices or superseded tickets return `None`.
    pub fn complete(&mut self, ticket: &PingTicket, up: bool, now: Instant) -> Option<CheckOutcome> {
        let record = self.records.get_mut(&ticket.device_id)?;
        if record.phase != Phase::Checking(ticket.token) {
            debug!(device_id = %ticket.device_id, "discarding stale health result");
            return None;
        }
        record.up = Some(up);
        record.last_checked = Some(now);

        let delay = if up {
            record.failures = 0;
            self.policy.up_interval
        } else {
            record.failures = (record.failures + 1).min(self.policy.max_retries);
            if record.failures >= self.policy.max_retries {
                record.phase = Phase::Silenced;
                info!(
                    device_id = %ticket.device_id,
                    failures = record.failures,
                    "health checks silenced until manual recheck"
                );
                return Some(CheckOutcome::Silenced);
            }
            self.policy.retry_interval
        };

        let timer = self
            .timers
            .schedule_after(now, delay, ticket.device_id.clone());
        record.phase = Phase::Pending(timer);
        Some(CheckOutcome::Rescheduled(delay))
    }

    pub fn remove(&mut self, device_id: &str) -> bool {
        match self.records.remove(device_id) {
            Some(record) => {
                if let Phase::Pending(timer) = record.phase {
                    self.timers.cancel(timer);
                }
                true
            }
            None => false,
        }
    }

    /// Drops records (and timers) for every device not in `keep`.
    pub fn retain(&mut self, keep: &HashSet<&str>) {
        let gone: Vec<String> = self
            .records
            .keys()
            .filter(|id| !keep.contains(id.as_str()))
            .cloned()
            .collect();
        for id in gone {
            self.remove(&id);
        }
    }

    pub fn view(&self, device_id: &str, now: Instant) -> HealthView {
        let Some(record) = self.records.get(device_id) else {
            return HealthView::Unknown;
        };
        let fresh = record
            .last_checked
            .map(|at| now.saturating_duration_since(at) <= self.policy.stale_after)
            .unwrap_or(false);
        match (fresh, record.up) {
            (true, Some(true)) => HealthView::Up,
            (true, Some(false)) => HealthView::Down {
                failures: record.failures,
            },
            _ if record.is_checking() => HealthView::Checking,
            _ => HealthView::Unknown,
        }
    }

    /// Pending timers plus outstanding checks for one device. Never above one.
    pub fn scheduled_checks(&self, device_id: &str) -> usize {
        let timers = self
            .timers
            .pending_keys()
            .filter(|id| id.as_str() == device_id)
            .count();
        let checking = self
            .records
            .get(device_id)
            .map(|r| usize::from(r.is_checking()))
            .unwrap_or(0);
        timers + checking
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn scheduler() -> HealthScheduler {
        HealthScheduler::new(HealthPolicy::default())
    }

    #[test]
    fn ensure_polling_is_idempotent() {
        let t0 = Instant::now();
        let mut health = scheduler();
        assert!(health.ensure_polling("sw1", t0));
        assert!(!health.ensure_polling("sw1", t0));
        assert_eq!(health.scheduled_checks("sw1"), 1);

        let tickets = health.due(t0);
        assert_eq!(tickets.len(), 1);
        assert!(!health.ensure_polling("sw1", t0));
        assert_eq!(health.scheduled_checks("sw1"), 1);
    }

    #[test]
    fn up_reschedules_after_long_interval() {
        let t0 = Instant::now();
        let mut health = scheduler();
        health.ensure_polling("sw1", t0);
        let ticket = health.due(t0).remove(0);

        assert_eq!(
            health.complete(&ticket, true, t0),
            Some(CheckOutcome::Rescheduled(secs(60)))
        );
        assert_eq!(health.view("sw1", t0), HealthView::Up);
        assert!(health.due(t0 + secs(59)).is_empty());
        assert_eq!(health.due(t0 + secs(60)).len(), 1);
    }

    #[test]
    fn three_failures_silence_until_manual_recheck() {
        let mut now = Instant::now();
        let mut health = scheduler();
        health.ensure_polling("sw1", now);

        for attempt in 1..=3 {
            let ticket = health.due(now).remove(0);
            let outcome = health.complete(&ticket, false, now);
            if attempt < 3 {
                assert_eq!(outcome, Some(CheckOutcome::Rescheduled(secs(5))));
            } else {
                assert_eq!(outcome, Some(CheckOutcome::Silenced));
            }
            now += secs(5);
        }

        assert_eq!(health.scheduled_checks("sw1"), 0);
        assert!(health.due(now + secs(3600)).is_empty());
        assert_eq!(health.next_deadline(), None);
        assert!(!health.ensure_polling("sw1", now));

        let ticket = health.manual_recheck("sw1").unwrap();
        assert_eq!(health.record("sw1").unwrap().failures, 0);
        assert_eq!(health.view("sw1", now), HealthView::Checking);
        assert_eq!(
            health.complete(&ticket, false, now),
            Some(CheckOutcome::Rescheduled(secs(5)))
        );
        assert_eq!(health.scheduled_checks("sw1"), 1);
    }

    #[test]
    fn manual_recheck_cancels_pending_timer_and_supersedes_in_flight() {
        let t0 = Instant::now();
        let mut health = scheduler();
        health.ensure_polling("sw1", t0);
        let periodic = health.due(t0).remove(0);

        let manual = health.manual_recheck("sw1").unwrap();
        assert_eq!(health.complete(&periodic, true, t0), None);
        assert_eq!(health.view("sw1", t0), HealthView::Checking);

        health.complete(&manual, true, t0).unwrap();
        let again = health.manual_recheck("sw1").unwrap();
        assert_eq!(health.scheduled_checks("sw1"), 1);
        assert!(health.due(t0 + secs(120)).is_empty());
        assert!(health.complete(&again, true, t0).is_some());
    }

    #[test]
    fn removed_device_loses_timer_and_ignores_late_results() {
        let t0 = Instant::now();
        let mut health = scheduler();
        health.ensure_polling("sw1", t0);
        health.ensure_polling("sw2", t0);
        let tickets = health.due(t0);
        for ticket in &tickets {
            health.complete(ticket, true, t0);
        }

        health.retain(&HashSet::from(["sw2"]));
        assert!(!health.contains("sw1"));
        assert_eq!(health.scheduled_checks("sw1"), 0);
        let fired = health.due(t0 + secs(60));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].device_id, "sw2");

        assert_eq!(health.complete(&tickets[0], false, t0), None);
        assert_eq!(health.view("sw1", t0), HealthView::Unknown);
    }

    #[test]
    fn stale_results_show_unknown() {
        let t0 = Instant::now();
        let mut health = scheduler();
        health.ensure_polling("sw1", t0);
        let ticket = health.due(t0).remove(0);
        health.complete(&ticket, false, t0);
        assert_eq!(health.view("sw1", t0), HealthView::Down { failures: 1 });
        assert_eq!(health.view("sw1", t0 + secs(121)), HealthView::Unknown);
    }
}
