//! Fluent builder for workflow graphs
//!
//! Builds graphs with caller-chosen node IDs, which the mutation API does
//! not allow. Templates and tests use it; no invariants are checked.

use crate::graph::WorkflowGraph;
use crate::types::{NodeType, Position, WorkflowConnection, WorkflowNode};

/// Fluent builder for constructing workflow graphs
///
/// # Example
///
/// ```ignore
/// let graph = WorkflowBuilder::new()
///     .add_node("t1", NodeType::Trigger, Some("ticket_created"), (100.0, 100.0))
///     .add_node("a1", NodeType::Action, Some("assign_ticket"), (400.0, 100.0))
///     .connect("t1", "a1")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    nodes: Vec<WorkflowNode>,
    connections: Vec<WorkflowConnection>,
    connection_counter: usize,
}

impl WorkflowBuilder {
    /// Create a new workflow builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with an explicit ID
    pub fn add_node(
        mut self,
        id: impl Into<String>,
        node_type: NodeType,
        subtype: Option<&str>,
        position: (f64, f64),
    ) -> Self {
        let mut config = serde_json::Map::new();
        if let Some(subtype) = subtype {
            config.insert(node_type.subtype_key().to_string(), subtype.into());
        }
        self.nodes.push(WorkflowNode {
            id: id.into(),
            node_type,
            position: Some(Position::from(position)),
            label: node_type.label_for(subtype).to_string(),
            config,
        });
        self
    }

    /// Add a trigger node
    pub fn trigger(self, id: impl Into<String>, trigger_type: &str, position: (f64, f64)) -> Self {
        self.add_node(id, NodeType::Trigger, Some(trigger_type), position)
    }

    /// Add an action node
    pub fn action(self, id: impl Into<String>, action_type: &str, position: (f64, f64)) -> Self {
        self.add_node(id, NodeType::Action, Some(action_type), position)
    }

    /// Add a condition node
    pub fn condition(self, id: impl Into<String>, condition_type: &str, position: (f64, f64)) -> Self {
        self.add_node(id, NodeType::Condition, Some(condition_type), position)
    }

    /// Merge extra keys into the config of the most recently added node
    ///
    /// Must be called immediately after `add_node` (or a shorthand).
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        if let (Some(node), serde_json::Value::Object(map)) = (self.nodes.last_mut(), config) {
            node.config.extend(map);
        }
        self
    }

    /// Clear the position of the most recently added node
    ///
    /// Reproduces records that lost their layout.
    pub fn without_position(mut self) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.position = None;
        }
        self
    }

    /// Connect two nodes (auto-generates the connection ID)
    pub fn connect(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.push_connection(source.into(), target.into(), None)
    }

    /// Connect a node from a named source handle
    pub fn connect_from(
        self,
        source: impl Into<String>,
        handle: &str,
        target: impl Into<String>,
    ) -> Self {
        self.push_connection(source.into(), target.into(), Some(handle))
    }

    fn push_connection(mut self, source: String, target: String, handle: Option<&str>) -> Self {
        self.connection_counter += 1;
        self.connections.push(WorkflowConnection {
            id: format!("conn-{}", self.connection_counter),
            source_node_id: source,
            target_node_id: target,
            source_handle: handle.map(str::to_string),
            target_handle: None,
            label: handle.unwrap_or_default().to_string(),
        });
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> WorkflowGraph {
        WorkflowGraph::from_parts(self.nodes, self.connections)
    }
}
