//! All client-side state, owned in one place.
//!
//! The session is synchronous: it never performs I/O besides the clipboard.
//! The dispatcher turns its state transitions into backend requests and the
//! driver feeds the results back in.

use std::time::Instant;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::clipboard::{copy_best_effort, Clipboard};
use crate::config::Config;
use crate::drafts::{DraftField, DraftStore, ReservationInput, ValidationError};
use crate::editing::EditingFlags;
use crate::error::Result;
use crate::health::{CheckOutcome, HealthScheduler, PingTicket};
use crate::notice::NoticeBoard;
use crate::render::{RenderContext, RenderStats, Renderer, TableView};
use crate::sync::{SnapshotDiff, SnapshotSync};
use crate::types::{Device, Tag};

/// Which copy button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyTarget {
    Ssh,
    Telnet,
}

impl CopyTarget {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "ssh" | "mgmt" => Some(CopyTarget::Ssh),
            "telnet" | "console" => Some(CopyTarget::Telnet),
            _ => None,
        }
    }
}

pub struct ClientSession {
    id: Uuid,
    sync: SnapshotSync,
    drafts: DraftStore,
    editing: EditingFlags,
    health: HealthScheduler,
    renderer: Renderer,
    notices: NoticeBoard,
    clipboard: Box<dyn Clipboard>,
}

impl ClientSession {
    pub fn new(config: &Config, clipboard: Box<dyn Clipboard>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync: SnapshotSync::new(),
            drafts: DraftStore::new(),
            editing: EditingFlags::new(config.blur_grace()),
            health: HealthScheduler::new(config.health_policy()),
            renderer: Renderer::new(config.render_options()),
            notices: NoticeBoard::new(config.notice_ttl()),
            clipboard,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn devices(&self) -> &[Device] {
        self.sync.current_devices()
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.sync.device(device_id)
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    pub fn health(&self) -> &HealthScheduler {
        &self.health
    }

    pub fn editing(&self) -> &EditingFlags {
        &self.editing
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn view(&self) -> &TableView {
        self.renderer.view()
    }

    /// Replaces the device list, tears down state for devices that vanished,
    /// arms health checks for new ones and re-renders.
    pub fn apply_snapshot(&mut self, devices: Vec<Device>, now: Instant) -> SnapshotDiff {
        let diff = self.sync.apply(devices);

        let ids = self.sync.ids();
        self.drafts.retain(&ids);
        self.editing.retain(&ids);
        self.health.retain(&ids);

        for device in self.sync.current_devices() {
            if device.tag != Tag::Free && self.drafts.clear(&device.device_id).is_some() {
                debug!(device_id = %device.device_id, "dropping draft for taken device");
            }
            self.health.ensure_polling(&device.device_id, now);
        }

        self.render(now);
        diff
    }

    /// Logs a failed fetch and keeps the current view.
    pub fn apply_fetched(&mut self, fetched: Result<Vec<Device>>, now: Instant) -> Option<SnapshotDiff> {
        match fetched {
            Ok(devices) => Some(self.apply_snapshot(devices, now)),
            Err(e) => {
                warn!(session = %self.id, error = %e, "device refresh failed");
                None
            }
        }
    }

    pub fn render(&mut self, now: Instant) -> RenderStats {
        let ctx = RenderContext {
            drafts: &self.drafts,
            health: &self.health,
            editing: &self.editing,
            now,
        };
        self.renderer.render(self.sync.current_devices(), &ctx)
    }

    pub fn due_pings(&mut self, now: Instant) -> Vec<PingTicket> {
        let tickets = self.health.due(now);
        if !tickets.is_empty() {
            self.render(now);
        }
        tickets
    }

    pub fn manual_recheck(&mut self, device_id: &str, now: Instant) -> Option<PingTicket> {
        let ticket = self.health.manual_recheck(device_id);
        match ticket {
            Some(_) => {
                self.render(now);
            }
            None => self.notices.error(format!("unknown device {}", device_id), now),
        }
        ticket
    }

    /// Request failures count as down.
    pub fn finish_ping(
        &mut self,
        ticket: &PingTicket,
        result: Result<bool>,
        now: Instant,
    ) -> Option<CheckOutcome> {
        let up = match result {
            Ok(up) => up,
            Err(e) => {
                debug!(device_id = %ticket.device_id, error = %e, "health check failed");
                false
            }
        };
        let outcome = self.health.complete(ticket, up, now);
        if outcome.is_some() {
            self.render(now);
        }
        outcome
    }

    pub fn focus(&mut self, device_id: &str) {
        self.editing.focus(device_id);
    }

    pub fn blur(&mut self, device_id: &str, now: Instant) {
        self.editing.blur(device_id, now);
    }

    /// Only free devices carry a reservation form.
    pub fn edit_draft(
        &mut self,
        device_id: &str,
        field: DraftField,
        value: impl Into<String>,
        now: Instant,
    ) -> std::result::Result<(), ValidationError> {
        self.ensure_free(device_id)?;
        self.drafts.edit(device_id, field, value);
        self.render(now);
        Ok(())
    }

    /// Parses the device's draft for submission.
    pub fn validate_reservation(
        &self,
        device_id: &str,
    ) -> std::result::Result<ReservationInput, ValidationError> {
        self.ensure_free(device_id)?;
        self.drafts.get_or_default(device_id).parse(device_id)
    }

    fn ensure_free(&self, device_id: &str) -> std::result::Result<(), ValidationError> {
        match self.sync.device(device_id) {
            None => Err(ValidationError::UnknownDevice(device_id.to_string())),
            Some(device) if device.tag != Tag::Free => {
                Err(ValidationError::NotFree(device_id.to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    pub fn clear_draft(&mut self, device_id: &str) {
        self.drafts.clear(device_id);
    }

    pub fn begin_action(&mut self, device_id: &str) {
        self.editing.begin_action(device_id);
    }

    pub fn end_action(&mut self, device_id: &str, now: Instant) {
        self.editing.end_action(device_id);
        self.render(now);
    }

    pub fn notify(&mut self, text: impl Into<String>, now: Instant) {
        self.notices.info(text, now);
    }

    pub fn notify_error(&mut self, text: impl Into<String>, now: Instant) {
        self.notices.error(text, now);
    }

    pub fn dismiss_notices(&mut self) {
        self.notices.dismiss_all();
    }

    /// Copies what the row's copy button carries. Returns whether anything
    /// reached the clipboard.
    pub fn copy(&mut self, device_id: &str, target: CopyTarget, now: Instant) -> bool {
        let text = self.renderer.view().row(device_id).and_then(|row| match target {
            CopyTarget::Ssh => row.mgmt.copy.clone(),
            CopyTarget::Telnet => row.console.copy.clone(),
        });
        let Some(text) = text else {
            self.notices.error(format!("nothing to copy for {}", device_id), now);
            return false;
        };
        let copied = copy_best_effort(self.clipboard.as_mut(), &text);
        if copied {
            self.notices.info(format!("copied: {}", text), now);
        }
        copied
    }

    /// Expires blur grace periods and notices. Returns whether the view changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let released = self.editing.expire(now);
        let expired = self.notices.expire(now);
        if !released.is_empty() {
            debug!(rows = ?released, "editing released");
            self.render(now);
        }
        !released.is_empty() || expired
    }

    /// Earliest instant at which `tick` or `due_pings` has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.health.next_deadline(),
            self.editing.next_deadline(),
            self.notices.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}
