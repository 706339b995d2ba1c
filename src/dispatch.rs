//! Turns user actions into backend requests.
//!
//! Every action returns a boxed future that resolves to a [`Completion`]. The
//! driver polls them alongside everything else and hands each completion back
//! to [`Dispatcher::complete`], which applies it to the session and may ask
//! for a follow-up resync.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use crate::drafts::DraftField;
use crate::error::Result;
use crate::health::PingTicket;
use crate::net::Backend;
use crate::session::ClientSession;
use crate::types::{Device, ReserveRequest, Tag};

pub type Pending = BoxFuture<'static, Completion>;

#[derive(Debug)]
pub enum Completion {
    Snapshot(Result<Vec<Device>>),
    Reserved { device_id: String, result: Result<()> },
    Released { device_id: String, result: Result<()> },
    Pinged {
        ticket: PingTicket,
        result: Result<bool>,
        /// Started by the user; the row stays editing until it lands
        manual: bool,
    },
}

/// Values typed into the reservation form at submit time. `None` keeps what
/// the draft already holds.
#[derive(Debug, Clone, Default)]
pub struct ReserveForm<'a> {
    pub owner: Option<&'a str>,
    pub hours: Option<&'a str>,
    pub minutes: Option<&'a str>,
}

impl<'a> ReserveForm<'a> {
    pub fn new(owner: &'a str, hours: &'a str, minutes: &'a str) -> Self {
        Self {
            owner: Some(owner),
            hours: Some(hours),
            minutes: Some(minutes),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn resync(&self) -> Pending {
        let backend = Arc::clone(&self.backend);
        async move { Completion::Snapshot(backend.list_devices().await) }.boxed()
    }

    /// Stores the form in the draft, validates it and sends the reservation.
    /// Validation failures become an error notice and nothing is sent.
    pub fn reserve(
        &self,
        session: &mut ClientSession,
        device_id: &str,
        form: ReserveForm<'_>,
        now: Instant,
    ) -> Option<Pending> {
        let fields = [
            (DraftField::Owner, form.owner),
            (DraftField::Hours, form.hours),
            (DraftField::Minutes, form.minutes),
        ];
        for (field, value) in fields {
            let Some(value) = value else { continue };
            if let Err(e) = session.edit_draft(device_id, field, value, now) {
                session.notify_error(e.to_string(), now);
                return None;
            }
        }

        let input = match session.validate_reservation(device_id) {
            Ok(input) => input,
            Err(e) => {
                session.notify_error(e.to_string(), now);
                return None;
            }
        };
        let duration_minutes = input.total_minutes();
        let request = ReserveRequest {
            device_id: device_id.to_string(),
            owner: input.owner,
            duration_minutes,
        };
        session.begin_action(device_id);
        info!(device_id, owner = %request.owner, minutes = request.duration_minutes, "reserving");

        let backend = Arc::clone(&self.backend);
        let device_id = device_id.to_string();
        Some(
            async move {
                let result = backend.reserve(&request).await;
                Completion::Reserved { device_id, result }
            }
            .boxed(),
        )
    }

    /// Whether `device_id` can be released right now. Reports why not as a
    /// notice.
    pub fn can_release(&self, session: &mut ClientSession, device_id: &str, now: Instant) -> bool {
        match session.device(device_id).map(|d| d.tag.clone()) {
            Some(Tag::Reserved) => true,
            Some(_) => {
                session.notify_error(format!("{} is not reserved", device_id), now);
                false
            }
            None => {
                session.notify_error(format!("unknown device {}", device_id), now);
                false
            }
        }
    }

    /// Sends a release once `confirm` agrees.
    pub fn release(
        &self,
        session: &mut ClientSession,
        device_id: &str,
        confirm: impl FnOnce(&str) -> bool,
        now: Instant,
    ) -> Option<Pending> {
        if !self.can_release(session, device_id, now) || !confirm(device_id) {
            return None;
        }
        session.begin_action(device_id);
        info!(device_id, "releasing");

        let backend = Arc::clone(&self.backend);
        let device_id = device_id.to_string();
        Some(
            async move {
                let result = backend.release(&device_id).await;
                Completion::Released { device_id, result }
            }
            .boxed(),
        )
    }

    pub fn manual_health_check(
        &self,
        session: &mut ClientSession,
        device_id: &str,
        now: Instant,
    ) -> Option<Pending> {
        let ticket = session.manual_recheck(device_id, now)?;
        session.begin_action(device_id);
        Some(self.ping(ticket, true))
    }

    pub fn pings(&self, tickets: Vec<PingTicket>) -> Vec<Pending> {
        tickets.into_iter().map(|t| self.ping(t, false)).collect()
    }

    fn ping(&self, ticket: PingTicket, manual: bool) -> Pending {
        let backend = Arc::clone(&self.backend);
        async move {
            let result = backend.ping(&ticket.device_id).await;
            Completion::Pinged {
                ticket,
                result,
                manual,
            }
        }
        .boxed()
    }

    /// Applies a finished request. Returns the resync to run next, if any.
    pub fn complete(
        &self,
        session: &mut ClientSession,
        completion: Completion,
        now: Instant,
    ) -> Option<Pending> {
        match completion {
            Completion::Snapshot(fetched) => {
                session.apply_fetched(fetched, now);
                None
            }
            Completion::Reserved { device_id, result } => {
                session.end_action(&device_id, now);
                match result {
                    Ok(()) => {
                        session.clear_draft(&device_id);
                        session.notify(format!("reserved {}", device_id), now);
                        Some(self.resync())
                    }
                    Err(e) => {
                        warn!(device_id = %device_id, error = %e, "reservation failed");
                        session.notify_error(format!("reserve {} failed: {}", device_id, e), now);
                        None
                    }
                }
            }
            Completion::Released { device_id, result } => {
                session.end_action(&device_id, now);
                match result {
                    Ok(()) => {
                        session.notify(format!("released {}", device_id), now);
                        Some(self.resync())
                    }
                    Err(e) => {
                        warn!(device_id = %device_id, error = %e, "release failed");
                        session.notify_error(format!("release {} failed: {}", device_id, e), now);
                        None
                    }
                }
            }
            Completion::Pinged {
                ticket,
                result,
                manual,
            } => {
                session.finish_ping(&ticket, result, now);
                if manual {
                    session.end_action(&ticket.device_id, now);
                }
                None
            }
        }
    }
}
