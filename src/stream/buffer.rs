//! Bounded in-memory state owned by the stream client.

use std::collections::VecDeque;

use serde_json::Value;
use uuid::Uuid;

use crate::event::MonitorEvent;

/// Cap on the event log; the oldest entry is dropped beyond this.
pub const MAX_EVENTS: usize = 1000;

/// Cap on distinct run ids in the streaming-text buffer.
pub const MAX_STREAM_ENTRIES: usize = 100;

/// Newest-first log of received events, capped at a fixed number of entries.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<MonitorEvent>,
    max_entries: usize,
}

impl EventLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    /// Prepend an event, dropping the oldest once over capacity.
    pub fn push(&mut self, event: MonitorEvent) {
        self.entries.push_front(event);
        if self.entries.len() > self.max_entries {
            self.entries.pop_back();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<MonitorEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Accumulated `llm.stream` text keyed by run id.
///
/// Entries keep insertion order so the least-recently-created run can be
/// evicted once the ceiling is reached. Existing keys keep accumulating
/// regardless of the ceiling; only admitting a new key evicts.
#[derive(Debug)]
pub struct StreamContentBuffer {
    entries: Vec<(String, String)>,
    max_entries: usize,
}

impl StreamContentBuffer {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    /// Append a fragment for `run_id`, admitting the key first if it is new.
    /// An empty fragment still admits the key.
    pub fn append(&mut self, run_id: &str, fragment: &str) {
        if let Some((_, text)) = self.entries.iter_mut().find(|(key, _)| key == run_id) {
            text.push_str(fragment);
            return;
        }

        if self.entries.len() >= self.max_entries {
            self.entries.remove(0);
        }
        self.entries.push((run_id.to_string(), fragment.to_string()));
    }

    pub fn get(&self, run_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == run_id)
            .map(|(_, text)| text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in creation order.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Resolve the buffer key for a streaming event: payload `run_id` when it is a
/// non-empty string, else the event id, else a generated fallback so even a
/// malformed payload lands in some buffer.
pub(crate) fn resolve_run_id(event: &MonitorEvent) -> String {
    if let Some(Value::String(run_id)) = event.data.get("run_id") {
        if !run_id.is_empty() {
            return run_id.clone();
        }
    }
    if !event.id.is_empty() {
        return event.id.clone();
    }
    format!("fallback-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use serde_json::json;

    fn event(id: &str, data: serde_json::Value) -> MonitorEvent {
        MonitorEvent {
            id: id.to_string(),
            event_type: EventType::LlmStream,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            trace_id: None,
            span_id: None,
            parent_id: None,
            agent_id: None,
            agent_name: None,
            data: data.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn log_is_newest_first() {
        let mut log = EventLog::new(10);
        for i in 0..3 {
            log.push(event(&format!("e{i}"), json!({})));
        }
        let ids: Vec<_> = log.snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["e2", "e1", "e0"]);
    }

    #[test]
    fn log_drops_oldest_beyond_cap() {
        let mut log = EventLog::new(1000);
        for i in 0..1005 {
            log.push(event(&format!("e{i}"), json!({})));
        }
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 1000);
        assert_eq!(snapshot.first().map(|e| e.id.as_str()), Some("e1004"));
        assert_eq!(snapshot.last().map(|e| e.id.as_str()), Some("e5"));
    }

    #[test]
    fn buffer_concatenates_in_arrival_order() {
        let mut buffer = StreamContentBuffer::new(10);
        buffer.append("run-a", "Hel");
        buffer.append("run-b", "other");
        buffer.append("run-a", "lo");
        assert_eq!(buffer.get("run-a"), Some("Hello"));
        assert_eq!(buffer.get("run-b"), Some("other"));
    }

    #[test]
    fn buffer_evicts_least_recently_created_key() {
        let mut buffer = StreamContentBuffer::new(2);
        buffer.append("run-a", "a");
        buffer.append("run-b", "b");
        buffer.append("run-c", "c");
        assert_eq!(buffer.get("run-a"), None);
        assert_eq!(buffer.get("run-b"), Some("b"));
        assert_eq!(buffer.get("run-c"), Some("c"));
    }

    #[test]
    fn existing_key_accumulates_at_capacity() {
        let mut buffer = StreamContentBuffer::new(2);
        buffer.append("run-a", "a");
        buffer.append("run-b", "b");
        buffer.append("run-a", "a");
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.get("run-a"), Some("aa"));
    }

    #[test]
    fn run_id_prefers_payload_then_event_id() {
        let with_run = event("e1", json!({ "run_id": "run-7" }));
        assert_eq!(resolve_run_id(&with_run), "run-7");

        let empty_run = event("e1", json!({ "run_id": "" }));
        assert_eq!(resolve_run_id(&empty_run), "e1");

        let non_string_run = event("e1", json!({ "run_id": 42 }));
        assert_eq!(resolve_run_id(&non_string_run), "e1");

        let nothing = event("", json!({}));
        assert!(resolve_run_id(&nothing).starts_with("fallback-"));
        assert_ne!(resolve_run_id(&nothing), resolve_run_id(&nothing));
    }
}
