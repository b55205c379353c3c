//! Event data model for the backend's live stream.
//!
//! Every message on the stream arrives on a named channel; the channel name is
//! the authoritative event type. Payloads are validated on arrival and dropped
//! (never thrown) when malformed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of channels carried by the backend event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "agent.start")]
    AgentStart,
    #[serde(rename = "agent.end")]
    AgentEnd,
    #[serde(rename = "llm.request")]
    LlmRequest,
    #[serde(rename = "llm.stream")]
    LlmStream,
    #[serde(rename = "llm.response")]
    LlmResponse,
    #[serde(rename = "tool.call")]
    ToolCall,
    #[serde(rename = "tool.result")]
    ToolResult,
    #[serde(rename = "retriever.start")]
    RetrieverStart,
    #[serde(rename = "retriever.end")]
    RetrieverEnd,
    #[serde(rename = "graph.start")]
    GraphStart,
    #[serde(rename = "graph.node")]
    GraphNode,
    #[serde(rename = "graph.end")]
    GraphEnd,
    #[serde(rename = "state.change")]
    StateChange,
    #[serde(rename = "error")]
    Error,
}

impl EventType {
    /// All known channels, in the order the backend documents them.
    pub const ALL: [EventType; 14] = [
        EventType::AgentStart,
        EventType::AgentEnd,
        EventType::LlmRequest,
        EventType::LlmStream,
        EventType::LlmResponse,
        EventType::ToolCall,
        EventType::ToolResult,
        EventType::RetrieverStart,
        EventType::RetrieverEnd,
        EventType::GraphStart,
        EventType::GraphNode,
        EventType::GraphEnd,
        EventType::StateChange,
        EventType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentStart => "agent.start",
            EventType::AgentEnd => "agent.end",
            EventType::LlmRequest => "llm.request",
            EventType::LlmStream => "llm.stream",
            EventType::LlmResponse => "llm.response",
            EventType::ToolCall => "tool.call",
            EventType::ToolResult => "tool.result",
            EventType::RetrieverStart => "retriever.start",
            EventType::RetrieverEnd => "retriever.end",
            EventType::GraphStart => "graph.start",
            EventType::GraphNode => "graph.node",
            EventType::GraphEnd => "graph.end",
            EventType::StateChange => "state.change",
            EventType::Error => "error",
        }
    }

    /// Resolve a channel name to its event type, if known.
    pub fn from_channel(name: &str) -> Option<EventType> {
        EventType::ALL.iter().find(|t| t.as_str() == name).copied()
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventType::AgentStart | EventType::AgentEnd => EventCategory::Agent,
            EventType::LlmRequest | EventType::LlmStream | EventType::LlmResponse => {
                EventCategory::Llm
            }
            EventType::ToolCall | EventType::ToolResult => EventCategory::Tool,
            EventType::RetrieverStart | EventType::RetrieverEnd => EventCategory::Retriever,
            EventType::GraphStart | EventType::GraphNode | EventType::GraphEnd => {
                EventCategory::Graph
            }
            EventType::StateChange => EventCategory::State,
            EventType::Error => EventCategory::Error,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse grouping of event types, for filtering and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Agent,
    Llm,
    Tool,
    Retriever,
    Graph,
    State,
    Error,
}

/// One occurrence reported by the backend.
///
/// Built from a validated payload plus the channel it arrived on; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Payload shape as it appears on the wire, before the channel tag is applied.
///
/// The derive doubles as the validation rule: the payload must be an object
/// with string `id` and `timestamp`, and `data` absent, null, or an object.
/// Anything else fails deserialization and the message is dropped.
#[derive(Debug, Deserialize)]
pub(crate) struct RawEvent {
    pub id: String,
    pub timestamp: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl RawEvent {
    /// Attach the channel tag. The channel always wins over any type-like
    /// field the payload may carry.
    pub fn into_event(self, event_type: EventType) -> MonitorEvent {
        MonitorEvent {
            id: self.id,
            event_type,
            timestamp: self.timestamp,
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_id: self.parent_id,
            agent_id: self.agent_id,
            agent_name: self.agent_name,
            data: self.data.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_names_round_trip() {
        for event_type in EventType::ALL {
            assert_eq!(EventType::from_channel(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::from_channel("llm.unknown"), None);
        assert_eq!(EventType::from_channel("connected"), None);
    }

    #[test]
    fn categories_cover_all_types() {
        assert_eq!(EventType::LlmStream.category(), EventCategory::Llm);
        assert_eq!(EventType::GraphNode.category(), EventCategory::Graph);
        assert_eq!(EventType::Error.category(), EventCategory::Error);
        assert_eq!(EventType::StateChange.category(), EventCategory::State);
    }

    #[test]
    fn valid_payload_parses() {
        let raw: RawEvent =
            serde_json::from_str(r#"{"id":"e1","timestamp":"2024-01-01T00:00:00Z"}"#)
                .expect("minimal payload is valid");
        let event = raw.into_event(EventType::AgentStart);
        assert_eq!(event.id, "e1");
        assert_eq!(event.event_type, EventType::AgentStart);
        assert!(event.data.is_empty());
    }

    #[test]
    fn channel_tag_wins_over_payload_type() {
        let raw: RawEvent = serde_json::from_value(json!({
            "id": "e1",
            "timestamp": "t",
            "type": "tool.call",
        }))
        .expect("unknown fields are ignored");
        let event = raw.into_event(EventType::LlmStream);
        assert_eq!(event.event_type, EventType::LlmStream);
    }

    #[test]
    fn null_data_defaults_to_empty_map() {
        let raw: RawEvent =
            serde_json::from_value(json!({ "id": "e1", "timestamp": "t", "data": null }))
                .expect("null data is valid");
        assert!(raw.into_event(EventType::Error).data.is_empty());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        for payload in [
            json!("not an object"),
            json!({ "timestamp": "t" }),
            json!({ "id": 42, "timestamp": "t" }),
            json!({ "id": "e1", "timestamp": 7 }),
            json!({ "id": "e1", "timestamp": "t", "data": [1, 2] }),
            json!(null),
        ] {
            assert!(
                serde_json::from_value::<RawEvent>(payload.clone()).is_err(),
                "expected rejection of {payload}"
            );
        }
    }
}
