//! Server-Sent Events client for `/api/events`.
//!
//! Every event carries a full snapshot. The stream task forwards them to the
//! driver over a channel and, when the connection drops, follows the configured
//! [`ReconnectPolicy`].

use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Device, SnapshotPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect with exponential backoff and jitter
    Backoff { initial: Duration, max: Duration },
    /// Give up on the stream and let the driver poll instead
    FallbackToPolling,
    /// Log the disconnect and stay disconnected
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Snapshot(Vec<Device>),
    Disconnected(String),
    /// The stream is gone for good; start polling
    Fallback,
    Stopped,
}

/// Incremental `text/event-stream` parser. Handles events split across
/// arbitrary chunk boundaries, CRLF line endings, comments and multi-line data.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns the data of every event completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }
        events
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// The next base delay, doubling up to `max`.
    pub fn next_base(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Base delay plus up to 25% random jitter.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next_base();
        let spread = (base.as_millis() / 4) as u64;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        base + Duration::from_millis(jitter)
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

pub struct EventStream {
    client: Client,
    url: String,
    policy: ReconnectPolicy,
}

impl EventStream {
    /// The stream needs its own client: a whole-request timeout would cut the
    /// long-lived response off.
    pub fn new(backend_url: &str, policy: ReconnectPolicy) -> Result<Self> {
        let url = format!("{}/api/events", backend_url.trim_end_matches('/'));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::transport(&url, e))?;
        Ok(Self {
            client,
            url,
            policy,
        })
    }

    /// Runs until the receiver is dropped or the policy says stop.
    pub async fn run(self, tx: UnboundedSender<StreamEvent>) {
        let mut backoff = match &self.policy {
            ReconnectPolicy::Backoff { initial, max } => Some(Backoff::new(*initial, *max)),
            _ => None,
        };

        loop {
            let err = match self.connect_once(&tx, backoff.as_mut()).await {
                Ok(()) => return,
                Err(e) => e,
            };
            warn!(url = %self.url, error = %err, "event stream disconnected");
            if tx.send(StreamEvent::Disconnected(err.to_string())).is_err() {
                return;
            }

            match (&self.policy, backoff.as_mut()) {
                (ReconnectPolicy::Backoff { .. }, Some(backoff)) => {
                    let delay = backoff.next_delay();
                    info!(delay_ms = delay.as_millis() as u64, "reconnecting event stream");
                    tokio::time::sleep(delay).await;
                    if tx.is_closed() {
                        return;
                    }
                }
                (ReconnectPolicy::FallbackToPolling, _) => {
                    info!("event stream lost, falling back to polling");
                    let _ = tx.send(StreamEvent::Fallback);
                    return;
                }
                _ => {
                    let _ = tx.send(StreamEvent::Stopped);
                    return;
                }
            }
        }
    }

    /// `Ok(())` only when the receiver has gone away.
    async fn connect_once(
        &self,
        tx: &UnboundedSender<StreamEvent>,
        backoff: Option<&mut Backoff>,
    ) -> Result<()> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::transport(&self.url, e))?;
        if !response.status().is_success() {
            return Err(Error::Status {
                url: self.url.clone(),
                status: response.status().as_u16(),
            });
        }
        info!(url = %self.url, "event stream connected");
        if let Some(backoff) = backoff {
            backoff.reset();
        }
        if tx.send(StreamEvent::Connected).is_err() {
            return Ok(());
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::transport(&self.url, e))?;
            for data in decoder.push(&chunk) {
                match SnapshotPayload::parse(&data) {
                    Ok(devices) => {
                        debug!(count = devices.len(), "snapshot from event stream");
                        if tx.send(StreamEvent::Snapshot(devices)).is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => warn!(error = %e, "skipping malformed stream payload"),
                }
            }
        }
        Err(Error::StreamClosed)
    }
}
