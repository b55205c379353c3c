//! Metrics polling client.
//!
//! Periodically fetches the backend's counter snapshot and exposes only the
//! most recent valid one. Every issued fetch is tagged with a sequence number
//! and a response is applied only while its tag is still current, so a late
//! response (including one racing teardown) can never clobber a newer
//! snapshot.

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::{lock, ApiResponse};

/// Fixed poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Why one poll produced no snapshot. The loop logs these and waits for the
/// next tick; the previous snapshot stays in place.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("metrics endpoint returned {status}")]
    Http { status: u16 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Rejected(String),
    #[error("response missing data")]
    MissingData,
}

/// Snapshot of backend counters. Replaced wholesale on every successful poll,
/// never merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_events: u64,
    pub agent_runs: u64,
    pub llm_calls: u64,
    pub tool_calls: u64,
    pub retriever_runs: u64,
    pub errors: u64,
    pub subscribers: u64,
    pub buffer_size: u64,
    pub uptime_seconds: u64,
}

/// Configuration for the metrics poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Scheme and host of the backend, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Tick interval between fetches.
    pub interval: Duration,
}

impl PollerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            interval: POLL_INTERVAL,
        }
    }
}

/// Client for `GET /api/metrics`.
pub struct MetricsPoller {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    config: PollerConfig,
    snapshot: Mutex<Metrics>,
    /// Sequence number of the most recently issued fetch.
    seq: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client: reqwest::Client::new(),
                config,
                snapshot: Mutex::new(Metrics::default()),
                seq: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// Fetch once immediately, then on the fixed interval.
    ///
    /// Fetches run one at a time inside the loop; ticks that would overlap a
    /// still-running fetch are skipped rather than queued, so a slow backend
    /// never accumulates concurrent requests.
    pub fn start(&self) {
        self.stop();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(inner.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let seq = inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
                inner.poll_once(seq).await;
            }
        });
        *lock(&self.inner.task) = Some(handle);
    }

    /// Cancel the poll loop. The sequence bump guarantees that a fetch still
    /// in flight at teardown is discarded when it resolves.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.inner.task).take() {
            handle.abort();
        }
        self.inner.seq.fetch_add(1, Ordering::SeqCst);
    }

    /// Most recent valid snapshot; all-zero until the first successful poll.
    pub fn snapshot(&self) -> Metrics {
        lock(&self.inner.snapshot).clone()
    }
}

impl Drop for MetricsPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    /// One fetch, tagged with the sequence number it was issued under.
    /// Failures of any kind leave the previous snapshot untouched.
    async fn poll_once(&self, seq: u64) {
        let metrics = match self.fetch().await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("metrics poll failed: {e}");
                return;
            }
        };

        // Last-issued-wins: apply only if no newer fetch was issued (and no
        // teardown happened) while this one was in flight.
        if self.seq.load(Ordering::SeqCst) != seq {
            debug!("discarding stale metrics response (seq {seq})");
            return;
        }
        *lock(&self.snapshot) = metrics;
    }

    async fn fetch(&self) -> Result<Metrics, PollError> {
        let url = format!("{}/api/metrics", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PollError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PollError::Http {
                status: response.status().as_u16(),
            });
        }

        let envelope: ApiResponse<Metrics> = response
            .json()
            .await
            .map_err(|e| PollError::InvalidResponse(e.to_string()))?;
        if !envelope.success {
            return Err(PollError::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        envelope.data.ok_or(PollError::MissingData)
    }
}

/// Format a non-negative seconds count as zero-padded `HH:MM:SS`; fractional
/// input is truncated toward zero and hours are unbounded.
pub fn format_uptime(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}
