use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use switchboard::clipboard::MemoryClipboard;
use switchboard::dispatch::{Completion, Dispatcher, ReserveForm};
use switchboard::drafts::{DraftField, InputDraft};
use switchboard::health::CheckOutcome;
use switchboard::net::Backend;
use switchboard::notice::NoticeLevel;
use switchboard::render::{ActionCell, ReservationCell};
use switchboard::session::ClientSession;
use switchboard::types::{Device, ReserveRequest, Tag};
use switchboard::{Config, Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    List,
    Reserve(ReserveRequest),
    Release(String),
    Ping(String),
}

/// Records every call. Action replies are scripted as `None` for ok or
/// `Some(reason)` for a rejection; unscripted calls succeed.
#[derive(Default)]
struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    devices: Mutex<Vec<Device>>,
    replies: Mutex<VecDeque<Option<String>>>,
    up: Mutex<bool>,
}

impl FakeBackend {
    fn with_devices(devices: Vec<Device>) -> Arc<Self> {
        let fake = Self::default();
        *fake.devices.lock().unwrap() = devices;
        Arc::new(fake)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn script(&self, reply: Option<&str>) {
        self.replies.lock().unwrap().push_back(reply.map(str::to_string));
    }

    fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock().unwrap() = devices;
    }

    fn reply(&self) -> Result<()> {
        match self.replies.lock().unwrap().pop_front().flatten() {
            Some(reason) => Err(Error::Rejected(reason)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.calls.lock().unwrap().push(Call::List);
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn reserve(&self, request: &ReserveRequest) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Reserve(request.clone()));
        self.reply()
    }

    async fn release(&self, device_id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Release(device_id.to_string()));
        self.reply()
    }

    async fn ping(&self, device_id: &str) -> Result<bool> {
        self.calls.lock().unwrap().push(Call::Ping(device_id.to_string()));
        Ok(*self.up.lock().unwrap())
    }
}

fn reserved(id: &str, owner: &str) -> Device {
    Device {
        tag: Tag::Reserved,
        current_user: Some(owner.into()),
        ..Device::new(id)
    }
}

fn setup(devices: Vec<Device>) -> (Arc<FakeBackend>, Dispatcher, ClientSession) {
    let backend = FakeBackend::with_devices(devices.clone());
    let dispatcher = Dispatcher::new(backend.clone());
    let mut session = ClientSession::new(&Config::default(), Box::new(MemoryClipboard::new()));
    session.apply_snapshot(devices, Instant::now());
    (backend, dispatcher, session)
}

/// Runs a request and every resync it triggers.
async fn settle(dispatcher: &Dispatcher, session: &mut ClientSession, request: switchboard::dispatch::Pending) {
    let mut next = Some(request);
    while let Some(request) = next {
        let completion = request.await;
        next = dispatcher.complete(session, completion, Instant::now());
    }
}

#[tokio::test]
async fn successful_reservation_clears_draft_and_resyncs() {
    let (backend, dispatcher, mut session) = setup(vec![Device::new("sw1")]);
    let now = Instant::now();

    let request = dispatcher
        .reserve(&mut session, "sw1", ReserveForm::new("alice", "1", "30"), now)
        .expect("request sent");
    assert!(session.editing().is_editing("sw1"));
    assert_eq!(session.drafts().get("sw1").unwrap().owner, "alice");

    backend.set_devices(vec![reserved("sw1", "alice")]);
    settle(&dispatcher, &mut session, request).await;

    assert_eq!(
        backend.calls(),
        vec![
            Call::Reserve(ReserveRequest {
                device_id: "sw1".into(),
                owner: "alice".into(),
                duration_minutes: 90,
            }),
            Call::List,
        ]
    );
    assert!(session.drafts().get("sw1").is_none());
    assert!(!session.editing().is_editing("sw1"));
    let row = session.view().row("sw1").unwrap();
    assert_eq!(row.action, ActionCell::Release);
    assert_eq!(row.status.text, "Reserved");
}

#[tokio::test]
async fn rejected_reservation_keeps_draft_and_reports_reason() {
    let (backend, dispatcher, mut session) = setup(vec![Device::new("sw1")]);
    backend.script(Some("in use"));

    let request = dispatcher
        .reserve(&mut session, "sw1", ReserveForm::new("alice", "1", "30"), Instant::now())
        .expect("request sent");
    settle(&dispatcher, &mut session, request).await;

    let notice = session.notices().latest().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.text.contains("in use"), "{}", notice.text);
    assert_eq!(
        session.drafts().get("sw1"),
        Some(&InputDraft {
            owner: "alice".into(),
            hours: "1".into(),
            minutes: "30".into(),
        })
    );
    assert_eq!(backend.calls().len(), 1);
    match &session.view().row("sw1").unwrap().reservation {
        ReservationCell::Form(draft) => assert_eq!(draft.minutes, "30"),
        other => panic!("expected form, got {:?}", other),
    }
}

#[tokio::test]
async fn invalid_reservations_never_reach_the_backend() {
    let (backend, dispatcher, mut session) =
        setup(vec![Device::new("sw1"), reserved("sw2", "bob")]);
    let now = Instant::now();

    assert!(dispatcher
        .reserve(&mut session, "sw1", ReserveForm::new("   ", "1", "0"), now)
        .is_none());
    assert!(dispatcher
        .reserve(&mut session, "sw1", ReserveForm::new("alice", "0", "x"), now)
        .is_none());
    assert!(dispatcher
        .reserve(&mut session, "sw2", ReserveForm::default(), now)
        .is_none());
    assert!(dispatcher
        .reserve(&mut session, "ghost", ReserveForm::default(), now)
        .is_none());

    assert!(backend.calls().is_empty());
    let texts: Vec<_> = session.notices().iter().map(|n| n.text.clone()).collect();
    assert_eq!(
        texts,
        vec![
            "enter an owner for sw1",
            "reservation length for sw1 must be more than zero minutes",
            "sw2 is not free",
            "unknown device ghost",
        ]
    );
}

#[tokio::test]
async fn release_goes_through_confirmation() {
    let (backend, dispatcher, mut session) = setup(vec![reserved("sw1", "bob")]);
    let now = Instant::now();

    assert!(dispatcher.release(&mut session, "sw1", |_| false, now).is_none());
    assert!(backend.calls().is_empty());

    let mut asked = Vec::new();
    let request = dispatcher
        .release(
            &mut session,
            "sw1",
            |id| {
                asked.push(id.to_string());
                true
            },
            now,
        )
        .expect("request sent");
    assert_eq!(asked, vec!["sw1"]);

    backend.set_devices(vec![Device::new("sw1")]);
    settle(&dispatcher, &mut session, request).await;
    assert_eq!(backend.calls(), vec![Call::Release("sw1".into()), Call::List]);
    assert_eq!(session.view().row("sw1").unwrap().action, ActionCell::Reserve);
}

#[test]
fn only_reserved_devices_can_be_released() {
    let (backend, dispatcher, mut session) = setup(vec![reserved("sw1", "bob"), Device::new("sw2")]);
    let now = Instant::now();

    assert!(dispatcher.can_release(&mut session, "sw1", now));
    assert!(!dispatcher.can_release(&mut session, "sw2", now));
    assert_eq!(session.notices().latest().unwrap().text, "sw2 is not reserved");
    assert!(!dispatcher.can_release(&mut session, "sw9", now));
    assert_eq!(session.notices().latest().unwrap().text, "unknown device sw9");

    let mut asked = false;
    let request = dispatcher.release(
        &mut session,
        "sw2",
        |_| {
            asked = true;
            true
        },
        now,
    );
    assert!(request.is_none());
    assert!(!asked);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn removed_device_loses_row_health_and_timers() {
    let (_backend, dispatcher, mut session) = setup(vec![Device::new("sw1"), Device::new("sw2")]);
    let now = Instant::now();

    let tickets = session.due_pings(now);
    assert_eq!(tickets.len(), 2);
    let stale = dispatcher.pings(tickets);

    session.apply_snapshot(vec![Device::new("sw2")], now);
    assert!(session.view().row("sw1").is_none());
    assert!(!session.health().contains("sw1"));
    assert_eq!(session.health().scheduled_checks("sw1"), 0);

    // in-flight results for the removed device are discarded
    for request in stale {
        let completion = request.await;
        if let Completion::Pinged { ticket, result, .. } = completion {
            let outcome = session.finish_ping(&ticket, result, now);
            if ticket.device_id == "sw1" {
                assert_eq!(outcome, None);
            } else {
                assert_eq!(outcome, Some(CheckOutcome::Rescheduled(Duration::from_secs(5))));
            }
        }
    }
    assert!(!session.health().contains("sw1"));
    let later = session.due_pings(now + Duration::from_secs(3600));
    assert!(later.iter().all(|t| t.device_id != "sw1"));
    assert_eq!(later.len(), 1);
}

#[tokio::test]
async fn drafts_survive_unrelated_snapshots() {
    let (_backend, _dispatcher, mut session) =
        setup(vec![Device::new("sw1"), reserved("sw2", "bob")]);
    let now = Instant::now();

    session.focus("sw1");
    session.edit_draft("sw1", DraftField::Owner, "erin", now).unwrap();
    session.edit_draft("sw1", DraftField::Hours, "3", now).unwrap();

    for remaining in [600, 540, 480] {
        let changed = Device {
            remaining_seconds: Some(remaining),
            ..reserved("sw2", "bob")
        };
        session.apply_snapshot(vec![Device::new("sw1"), changed], now);
        assert_eq!(session.drafts().get("sw1").unwrap().owner, "erin");
    }

    session.blur("sw1", now);
    session.tick(now + Duration::from_secs(1));
    match &session.view().row("sw1").unwrap().reservation {
        ReservationCell::Form(draft) => {
            assert_eq!(draft.owner, "erin");
            assert_eq!(draft.hours, "3");
        }
        other => panic!("expected form, got {:?}", other),
    }
}

#[tokio::test]
async fn manual_recheck_rearms_a_silenced_device() {
    let (backend, dispatcher, mut session) = setup(vec![Device::new("sw1")]);
    let mut now = Instant::now();

    for _ in 0..3 {
        let tickets = session.due_pings(now);
        assert_eq!(tickets.len(), 1);
        for request in dispatcher.pings(tickets) {
            dispatcher.complete(&mut session, request.await, now);
        }
        now += Duration::from_secs(5);
    }
    assert!(session.health().record("sw1").unwrap().is_silenced());
    assert_eq!(session.next_deadline(), None);
    assert_eq!(session.view().row("sw1").unwrap().health.text, "down (3)");

    *backend.up.lock().unwrap() = true;
    let request = dispatcher
        .manual_health_check(&mut session, "sw1", now)
        .expect("known device");
    assert_eq!(session.health().scheduled_checks("sw1"), 1);
    dispatcher.complete(&mut session, request.await, now);
    assert_eq!(session.view().row("sw1").unwrap().health.text, "up");
    assert_eq!(session.health().scheduled_checks("sw1"), 1);
}

#[tokio::test]
async fn manual_check_holds_the_row_until_it_lands() {
    let (_backend, dispatcher, mut session) = setup(vec![Device::new("sw1"), Device::new("sw2")]);
    let now = Instant::now();

    let scheduled = dispatcher.pings(session.due_pings(now));
    assert!(!session.editing().is_editing("sw2"));

    let request = dispatcher
        .manual_health_check(&mut session, "sw1", now)
        .expect("known device");
    assert!(session.editing().is_editing("sw1"));

    dispatcher.complete(&mut session, request.await, now);
    assert!(!session.editing().is_editing("sw1"));
    for request in scheduled {
        dispatcher.complete(&mut session, request.await, now);
    }
    assert!(!session.editing().is_editing("sw2"));
    assert!(dispatcher.manual_health_check(&mut session, "sw9", now).is_none());
}
