//! Graph editing state.
//!
//! A [`GraphStore`] is constructed explicitly and owned by its caller; there
//! is no process-wide shared instance. The presentation layer holds one per
//! editing surface and passes it by reference.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

use super::types::{GraphDefinition, GraphEdgeDef, GraphNodeDef, NodeType, Position};

/// Mutable editing state for one graph definition.
#[derive(Debug, Default)]
pub struct GraphStore {
    current: Option<GraphDefinition>,
    nodes: Vec<GraphNodeDef>,
    edges: Vec<GraphEdgeDef>,
    selected_node_id: Option<String>,
    dirty: bool,
    next_node_id: u64,
    next_edge_id: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[GraphNodeDef] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdgeDef] {
        &self.edges
    }

    pub fn current(&self) -> Option<&GraphDefinition> {
        self.current.as_ref()
    }

    /// Whether local edits diverge from the loaded definition.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn selected_node_id(&self) -> Option<&str> {
        self.selected_node_id.as_deref()
    }

    pub fn selected_node(&self) -> Option<&GraphNodeDef> {
        let id = self.selected_node_id.as_deref()?;
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Replace local state with a loaded definition.
    pub fn sync_from_definition(&mut self, definition: GraphDefinition) {
        self.nodes = definition.nodes.clone();
        self.edges = definition.edges.clone();
        self.current = Some(definition);
        self.dirty = false;
        self.selected_node_id = None;
    }

    /// Render local state back into a definition for create/update calls.
    /// The entry point is derived from the first `start` node.
    pub fn definition(&self) -> GraphDefinition {
        let entry_point = self
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::Start)
            .map(|n| n.id.clone())
            .unwrap_or_default();

        GraphDefinition {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            entry_point,
            ..self.current.clone().unwrap_or_default()
        }
    }

    pub fn add_node(
        &mut self,
        node_type: NodeType,
        name: impl Into<String>,
        position: Position,
        config: Option<Map<String, Value>>,
    ) -> &GraphNodeDef {
        let node = GraphNodeDef {
            id: self.generate_node_id(),
            name: name.into(),
            node_type,
            position,
            description: None,
            config,
        };
        let index = self.nodes.len();
        self.nodes.push(node);
        self.dirty = true;
        &self.nodes[index]
    }

    /// Remove a node along with every edge touching it; deselects it if it
    /// was selected.
    pub fn remove_node(&mut self, node_id: &str) {
        self.nodes.retain(|n| n.id != node_id);
        self.edges
            .retain(|e| e.source != node_id && e.target != node_id);
        if self.selected_node_id.as_deref() == Some(node_id) {
            self.selected_node_id = None;
        }
        self.dirty = true;
    }

    pub fn update_node_position(&mut self, node_id: &str, position: Position) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == node_id) {
            node.position = position;
            self.dirty = true;
        }
    }

    pub fn update_node_name(&mut self, node_id: &str, name: impl Into<String>) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == node_id) {
            node.name = name.into();
            self.dirty = true;
        }
    }

    pub fn update_node_description(&mut self, node_id: &str, description: Option<String>) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == node_id) {
            node.description = description;
            self.dirty = true;
        }
    }

    pub fn update_node_config(&mut self, node_id: &str, config: Option<Map<String, Value>>) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == node_id) {
            node.config = config;
            self.dirty = true;
        }
    }

    /// Add an edge; duplicate source→target pairs are rejected.
    pub fn add_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        label: Option<String>,
        condition: Option<String>,
    ) -> Option<&GraphEdgeDef> {
        let source = source.into();
        let target = target.into();
        if self
            .edges
            .iter()
            .any(|e| e.source == source && e.target == target)
        {
            debug!("rejecting duplicate edge {source} -> {target}");
            return None;
        }

        let edge = GraphEdgeDef {
            id: self.generate_edge_id(),
            source,
            target,
            label,
            condition,
        };
        self.edges.push(edge);
        self.dirty = true;
        self.edges.last()
    }

    pub fn remove_edge(&mut self, edge_id: &str) {
        self.edges.retain(|e| e.id != edge_id);
        self.dirty = true;
    }

    pub fn select_node(&mut self, node_id: Option<String>) {
        self.selected_node_id = node_id;
    }

    /// Start a fresh graph seeded with default start and end nodes. The
    /// seeded nodes count as edits, so a brand-new graph is already dirty
    /// and eligible for its first save.
    pub fn new_graph(&mut self, name: impl Into<String>) {
        self.clear();
        self.add_node(NodeType::Start, "Start", Position { x: 100.0, y: 250.0 }, None);
        self.add_node(NodeType::End, "End", Position { x: 700.0, y: 250.0 }, None);

        let now = Utc::now().to_rfc3339();
        self.current = Some(GraphDefinition {
            id: String::new(),
            name: name.into(),
            description: None,
            version: 0,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            entry_point: String::new(),
            metadata: None,
            created_at: now.clone(),
            updated_at: now,
        });
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.nodes.clear();
        self.edges.clear();
        self.dirty = false;
        self.selected_node_id = None;
    }

    fn generate_node_id(&mut self) -> String {
        self.next_node_id += 1;
        format!("node-{}-{}", Utc::now().timestamp_millis(), self.next_node_id)
    }

    fn generate_edge_id(&mut self) -> String {
        self.next_edge_id += 1;
        format!("edge-{}-{}", Utc::now().timestamp_millis(), self.next_edge_id)
    }
}
