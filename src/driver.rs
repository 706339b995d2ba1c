//! The client's event loop.
//!
//! One `select!` multiplexes the poll interval, push stream events, session
//! deadlines, finished backend requests, typed commands and Ctrl-C. Everything
//! runs on the current thread; the session is never shared.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::clipboard::Clipboard;
use crate::config::Config;
use crate::console::{UserCommand, HELP};
use crate::dispatch::{Dispatcher, Pending, ReserveForm};
use crate::net::Backend;
use crate::session::ClientSession;
use crate::stream::{EventStream, StreamEvent};
use crate::tui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Driver {
    session: ClientSession,
    dispatcher: Dispatcher,
    pending: FuturesUnordered<Pending>,
    awaiting_confirm: Option<String>,
    show_help: bool,
}

impl Driver {
    pub fn new(config: &Config, backend: Arc<dyn Backend>, clipboard: Box<dyn Clipboard>) -> Self {
        Self {
            session: ClientSession::new(config, clipboard),
            dispatcher: Dispatcher::new(backend),
            pending: FuturesUnordered::new(),
            awaiting_confirm: None,
            show_help: false,
        }
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn prompt(&self) -> String {
        match &self.awaiting_confirm {
            Some(id) => format!("release {}? [y/n] ", id),
            None => "> ".to_string(),
        }
    }

    fn push(&mut self, request: Option<Pending>) {
        if let Some(request) = request {
            self.pending.push(request);
        }
    }

    pub fn refresh(&mut self) {
        let request = self.dispatcher.resync();
        self.pending.push(request);
    }

    /// Runs one typed line.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Flow {
        match UserCommand::parse(line) {
            Ok(Some(command)) => self.handle_command(command, now),
            Ok(None) => Flow::Continue,
            Err(e) => {
                self.session.notify_error(e.to_string(), now);
                Flow::Continue
            }
        }
    }

    pub fn handle_command(&mut self, command: UserCommand, now: Instant) -> Flow {
        let confirming = self.awaiting_confirm.take();
        self.show_help = false;

        match command {
            UserCommand::Confirm(yes) => match confirming {
                Some(device_id) => {
                    let request = self
                        .dispatcher
                        .release(&mut self.session, &device_id, |_| yes, now);
                    self.push(request);
                }
                None => self.session.notify_error("nothing to confirm", now),
            },
            UserCommand::Set {
                device_id,
                field,
                value,
            } => {
                if let Err(e) = self.session.edit_draft(&device_id, field, value, now) {
                    self.session.notify_error(e.to_string(), now);
                }
            }
            UserCommand::Focus(device_id) => self.session.focus(&device_id),
            UserCommand::Blur(device_id) => self.session.blur(&device_id, now),
            UserCommand::Reserve {
                device_id,
                owner,
                hours,
                minutes,
            } => {
                let form = ReserveForm {
                    owner: owner.as_deref(),
                    hours: hours.as_deref(),
                    minutes: minutes.as_deref(),
                };
                let request = self.dispatcher.reserve(&mut self.session, &device_id, form, now);
                self.push(request);
            }
            UserCommand::Release(device_id) => {
                // The answer arrives as the next line.
                if self.dispatcher.can_release(&mut self.session, &device_id, now) {
                    self.awaiting_confirm = Some(device_id);
                }
            }
            UserCommand::Ping(device_id) => {
                let request = self
                    .dispatcher
                    .manual_health_check(&mut self.session, &device_id, now);
                self.push(request);
            }
            UserCommand::Copy { device_id, target } => {
                self.session.copy(&device_id, target, now);
            }
            UserCommand::Dismiss => self.session.dismiss_notices(),
            UserCommand::Refresh => self.refresh(),
            UserCommand::Help => self.show_help = true,
            UserCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Fires whatever is due: health checks, blur grace, notice expiry.
    pub fn on_deadline(&mut self, now: Instant) {
        let tickets = self.session.due_pings(now);
        for request in self.dispatcher.pings(tickets) {
            self.pending.push(request);
        }
        self.session.tick(now);
    }

    pub fn on_completion(&mut self, completion: crate::dispatch::Completion, now: Instant) {
        let follow_up = self.dispatcher.complete(&mut self.session, completion, now);
        self.push(follow_up);
    }

    /// Returns whether the loop should fall back to polling.
    pub fn on_stream_event(&mut self, event: StreamEvent, now: Instant) -> bool {
        match event {
            StreamEvent::Connected => {
                debug!("push stream up");
                false
            }
            StreamEvent::Snapshot(devices) => {
                self.session.apply_snapshot(devices, now);
                false
            }
            StreamEvent::Disconnected(reason) => {
                self.session.notify_error(format!("live updates lost: {}", reason), now);
                false
            }
            StreamEvent::Fallback => {
                self.session.notify("live updates unavailable, polling instead", now);
                true
            }
            StreamEvent::Stopped => false,
        }
    }

    pub fn draw<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let notices: Vec<_> = self.session.notices().iter().collect();
        tui::draw(out, self.session.view(), &notices, &self.prompt())?;
        if self.show_help {
            write!(out, "\r\n{}\r\n", HELP.replace('\n', "\r\n"))?;
            out.flush()?;
        }
        Ok(())
    }
}

/// Runs the client until `quit`, end of input or Ctrl-C.
pub async fn run(config: Config, backend: Arc<dyn Backend>, clipboard: Box<dyn Clipboard>) -> Result<()> {
    let mut driver = Driver::new(&config, backend, clipboard);
    let span = info_span!("session", id = %driver.session().id());
    let input = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    run_loop(&config, &mut driver, input, &mut stdout, tokio::signal::ctrl_c())
        .instrument(span)
        .await
}

/// Ends on `quit`, when `input` closes, or once `shutdown` resolves.
async fn run_loop<R, W, S>(
    config: &Config,
    driver: &mut Driver,
    input: R,
    out: &mut W,
    shutdown: S,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = io::Result<()>>,
{
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut streaming = config.streams();
    if streaming {
        let stream = EventStream::new(&config.backend_url, config.reconnect_policy())
            .context("setting up event stream")?;
        tokio::spawn(stream.run(tx).in_current_span());
    } else {
        drop(tx);
    }
    let mut polling = config.polls();
    info!(polling, streaming, backend = %config.backend_url, "starting");

    let mut poll = tokio::time::interval(config.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut lines = input.lines();

    if !polling {
        driver.refresh();
    }

    tokio::pin!(shutdown);

    loop {
        driver.draw(out).context("drawing")?;

        let now = Instant::now();
        let deadline = driver.session().next_deadline();
        let wake = tokio::time::Instant::from_std(deadline.unwrap_or(now + Duration::from_secs(3600)));

        tokio::select! {
            _ = poll.tick(), if polling => driver.refresh(),
            Some(event) = events.recv(), if streaming => {
                match event {
                    StreamEvent::Stopped => streaming = false,
                    event => {
                        if driver.on_stream_event(event, Instant::now()) {
                            streaming = false;
                            polling = true;
                            poll.reset();
                        }
                    }
                }
            }
            _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                driver.on_deadline(Instant::now());
            }
            Some(completion) = driver.pending.next(), if !driver.pending.is_empty() => {
                driver.on_completion(completion, Instant::now());
            }
            line = lines.next_line() => match line.context("reading input")? {
                Some(line) => {
                    if driver.handle_line(&line, Instant::now()) == Flow::Quit {
                        break;
                    }
                }
                None => {
                    info!("input closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                warn!("interrupted");
                break;
            }
        }
    }

    info!(in_flight = driver.in_flight(), "shutting down");
    Ok(())
}
