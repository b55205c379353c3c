//! Client library for an agent graph-execution backend.
//!
//! The backend (execution engine, event bus, SSE endpoint, metrics endpoint,
//! graph persistence) is external; this crate speaks its HTTP/SSE contract and
//! exposes state snapshots for a presentation layer to read:
//! - one live event subscription with bounded buffers and automatic
//!   reconnection,
//! - a periodic metrics poll that is immune to out-of-order responses,
//! - the builder REST surface and a caller-owned graph editing store.
//!
//! # Architecture
//!
//! - `event`: event data model and payload validation
//! - `stream`: SSE wire decoding, bounded buffers, and the stream client
//! - `metrics`: metrics snapshot, poll loop, uptime formatting
//! - `builder`: graph definition types, REST wrapper, editing store

pub mod builder;
pub mod event;
pub mod metrics;
pub mod stream;

pub use builder::{ApiError, BuilderApi, GraphStore};
pub use event::{EventCategory, EventType, MonitorEvent};
pub use metrics::{format_uptime, Metrics, MetricsPoller, PollError, PollerConfig};
pub use stream::{ConnectionStatus, EventStream, StreamConfig, StreamError};

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared wire types
// ---------------------------------------------------------------------------

/// Response envelope used by every builder and metrics endpoint.
///
/// The `Option` fields deliberately carry no `#[serde(default)]`: serde
/// already reads a missing field as `None`, and the attribute would add a
/// `T: Default` bound that payload types like `ValidationResult` do not meet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lock a state cell, recovering from poisoning. Every mutation in this crate
/// runs to completion without awaiting, so a poisoned lock only means a
/// panicking reader and the guarded state is still consistent.
pub(crate) fn lock<T>(cell: &Mutex<T>) -> MutexGuard<'_, T> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
