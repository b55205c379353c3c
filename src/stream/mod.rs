//! Live event stream client.
//!
//! Maintains one logical subscription to the backend's `/events` SSE endpoint,
//! keeps a bounded newest-first event log plus per-run streaming-text buffers,
//! and reconnects automatically after a fixed delay when the channel drops.
//!
//! Every [`EventStream::connect`] call supersedes the previous read loop: the
//! client bumps an epoch counter and spawns a fresh loop bound to it, so a
//! stale loop (including one sleeping before a reconnect) stops touching
//! shared state the moment a newer connect or an explicit disconnect happens.

mod buffer;
mod sse;


pub use buffer::{EventLog, StreamContentBuffer, MAX_EVENTS, MAX_STREAM_ENTRIES};
pub use sse::{SseDecoder, SseFrame};

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::event::{EventType, MonitorEvent, RawEvent};
use crate::lock;

/// Why one pass over the event channel ended. The read loop logs these and
/// falls through to the reconnect delay; they never escape the client.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("event endpoint returned {status}")]
    Http { status: u16 },
    #[error("read failed: {0}")]
    Read(String),
}

/// Fixed wait before an automatic reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Channel on which the backend acknowledges a fresh subscription.
const ACK_CHANNEL: &str = "connected";

/// Connection state of the stream client; exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionStatus {
    Connecting = 0,
    Connected = 1,
    Disconnected = 2,
    Paused = 3,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> ConnectionStatus {
        match value {
            0 => ConnectionStatus::Connecting,
            1 => ConnectionStatus::Connected,
            3 => ConnectionStatus::Paused,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Scheme and host of the backend, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Wait before an automatic reconnect attempt.
    pub reconnect_delay: Duration,
    /// Event log capacity.
    pub max_events: usize,
    /// Streaming-text buffer capacity (distinct run ids).
    pub max_stream_entries: usize,
}

impl StreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            reconnect_delay: RECONNECT_DELAY,
            max_events: MAX_EVENTS,
            max_stream_entries: MAX_STREAM_ENTRIES,
        }
    }
}

/// Client for the backend's live event channel.
pub struct EventStream {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    config: StreamConfig,
    status: AtomicU8,
    paused: AtomicBool,
    /// Whether the underlying channel is currently open; pause/resume reads
    /// this to decide whether resuming restores `Connected`.
    channel_open: AtomicBool,
    /// Bumped by every connect() and disconnect(). A read loop holding a
    /// stale epoch must stop touching shared state and exit.
    epoch: AtomicU64,
    log: Mutex<EventLog>,
    stream_content: Mutex<StreamContentBuffer>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventStream {
    pub fn new(config: StreamConfig) -> Self {
        let log = EventLog::new(config.max_events);
        let stream_content = StreamContentBuffer::new(config.max_stream_entries);
        Self {
            inner: Arc::new(Inner {
                client: reqwest::Client::new(),
                config,
                status: AtomicU8::new(ConnectionStatus::Connecting as u8),
                paused: AtomicBool::new(false),
                channel_open: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                log: Mutex::new(log),
                stream_content: Mutex::new(stream_content),
                task: Mutex::new(None),
            }),
        }
    }

    /// Open (or reopen) the subscription.
    ///
    /// Idempotent: a previous read loop is superseded and its pending
    /// reconnect cancelled before the new channel opens.
    pub fn connect(&self) {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.abort_task();
        self.inner.channel_open.store(false, Ordering::SeqCst);
        self.inner.set_status(ConnectionStatus::Connecting);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run(epoch).await });
        *lock(&self.inner.task) = Some(handle);
    }

    /// Tear the subscription down. Terminal: no reconnect fires afterwards
    /// until the next explicit [`connect`](Self::connect).
    pub fn disconnect(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.abort_task();
        self.inner.channel_open.store(false, Ordering::SeqCst);
        self.inner.set_status(ConnectionStatus::Disconnected);
        info!("event stream disconnected");
    }

    /// Flip the pause flag. While paused, inbound messages are still parsed
    /// and validated but dropped before mutating the log or buffers; they are
    /// not replayed on resume.
    pub fn toggle_pause(&self) {
        let paused = !self.inner.paused.fetch_xor(true, Ordering::SeqCst);
        if paused {
            self.inner.set_status(ConnectionStatus::Paused);
        } else if self.inner.channel_open.load(Ordering::SeqCst) {
            self.inner.set_status(ConnectionStatus::Connected);
        }
        debug!("event processing {}", if paused { "paused" } else { "resumed" });
    }

    /// Empty the event log and streaming buffers. Connection state is
    /// unaffected.
    pub fn clear(&self) {
        lock(&self.inner.log).clear();
        lock(&self.inner.stream_content).clear();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status()
    }

    pub fn paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Received events, newest first.
    pub fn events(&self) -> Vec<MonitorEvent> {
        lock(&self.inner.log).snapshot()
    }

    /// Accumulated streaming text per run id, in run creation order.
    pub fn stream_content(&self) -> Vec<(String, String)> {
        lock(&self.inner.stream_content).snapshot()
    }

    /// Accumulated streaming text for one run.
    pub fn stream_content_for(&self, run_id: &str) -> Option<String> {
        lock(&self.inner.stream_content)
            .get(run_id)
            .map(str::to_string)
    }

    fn abort_task(&self) {
        if let Some(handle) = lock(&self.inner.task).take() {
            handle.abort();
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.abort_task();
    }
}

impl Inner {
    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Read loop for one epoch: consume the channel until it drops, then keep
    /// reconnecting after the fixed delay for as long as this epoch is current
    /// and nothing else changed the status in the interim.
    async fn run(self: Arc<Self>, epoch: u64) {
        loop {
            if let Err(e) = self.read_channel(epoch).await {
                warn!("event stream error: {e}");
            }
            if !self.is_current(epoch) {
                return;
            }

            self.channel_open.store(false, Ordering::SeqCst);
            self.set_status(ConnectionStatus::Disconnected);

            debug!(
                "event stream lost, reconnecting in {:?}",
                self.config.reconnect_delay
            );
            sleep(self.config.reconnect_delay).await;

            if !self.is_current(epoch) {
                // Superseded by a manual connect() or disconnect() while the
                // delay was pending.
                return;
            }
            if self.status() != ConnectionStatus::Disconnected {
                return;
            }

            info!("attempting to reconnect");
            self.set_status(ConnectionStatus::Connecting);
        }
    }

    /// Open the channel and pump frames until it errors or closes.
    async fn read_channel(&self, epoch: u64) -> Result<(), StreamError> {
        let url = format!("{}/events", self.config.base_url);
        info!("connecting to event stream at {url}");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StreamError::Http {
                status: response.status().as_u16(),
            });
        }
        if !self.is_current(epoch) {
            return Ok(());
        }

        self.channel_open.store(true, Ordering::SeqCst);
        self.set_status(ConnectionStatus::Connected);
        info!("event stream connected");

        let mut decoder = SseDecoder::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if !self.is_current(epoch) {
                return Ok(());
            }
            let bytes = chunk.map_err(|e| StreamError::Read(e.to_string()))?;
            for frame in decoder.feed(&bytes) {
                self.dispatch(frame);
            }
        }

        debug!("event stream closed by server");
        Ok(())
    }

    /// Route one decoded frame into the ingestion pipeline. Per-message
    /// failures are logged and swallowed, never propagated to the read loop.
    fn dispatch(&self, frame: SseFrame) {
        if frame.event == ACK_CHANNEL {
            debug!("subscription acknowledged: {}", frame.data);
            return;
        }
        let Some(event_type) = EventType::from_channel(&frame.event) else {
            debug!("ignoring frame on unknown channel: {}", frame.event);
            return;
        };
        self.ingest(event_type, &frame.data);
    }

    fn ingest(&self, event_type: EventType, payload: &str) {
        let raw: RawEvent = match serde_json::from_str(payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("dropping malformed {event_type} payload: {e}");
                return;
            }
        };

        // Paused: validated, then dropped. No replay on resume.
        if self.paused.load(Ordering::SeqCst) {
            return;
        }

        let event = raw.into_event(event_type);

        if event.event_type == EventType::LlmStream {
            let run_id = buffer::resolve_run_id(&event);
            let fragment = event
                .data
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or("");
            lock(&self.stream_content).append(&run_id, fragment);
        }

        lock(&self.log).push(event);
    }
}
