//! The workflow graph and its mutation API
//!
//! `WorkflowGraph` owns the nodes and connections of a workflow. All
//! structural changes go through its methods, which reject invalid
//! mutations up front so a failed call never leaves the graph half
//! modified. Every successful mutation bumps [`WorkflowGraph::revision`] and
//! records a [`GraphChange`] that observers drain with
//! [`WorkflowGraph::take_changes`].

use serde::{Deserialize, Serialize};

use crate::constants::change_log;
use crate::error::GraphError;
use crate::types::{
    ConnectionId, NodeId, NodeType, Position, WorkflowConnection, WorkflowNode,
};

/// A change applied to the graph, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    NodeAdded(NodeId),
    /// The node and the connections that were removed with it
    NodeRemoved {
        node_id: NodeId,
        connections: Vec<ConnectionId>,
    },
    NodeMoved(NodeId),
    NodeUpdated(NodeId),
    /// A missing position was replaced by a fallback
    PositionRepaired(NodeId),
    ConnectionAdded(ConnectionId),
    ConnectionRemoved(ConnectionId),
}

/// Nodes and connections of a workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    nodes: Vec<WorkflowNode>,
    #[serde(default)]
    connections: Vec<WorkflowConnection>,
    #[serde(skip)]
    revision: u64,
    #[serde(skip)]
    changes: Vec<GraphChange>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a graph from raw parts without checking invariants
    ///
    /// Used for records that come from storage or templates; run
    /// [`crate::validation::validate_graph`] to find problems.
    pub fn from_parts(nodes: Vec<WorkflowNode>, connections: Vec<WorkflowConnection>) -> Self {
        Self {
            nodes,
            connections,
            revision: 0,
            changes: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    pub fn connections(&self) -> &[WorkflowConnection] {
        &self.connections
    }

    /// Monotonic counter bumped by every successful mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Drain the changes recorded since the last call
    ///
    /// Consecutive moves of one node are folded into a single entry and
    /// at most [`change_log::CAPACITY`] entries are kept, oldest dropped
    /// first. The revision still counts every mutation.
    pub fn take_changes(&mut self) -> Vec<GraphChange> {
        std::mem::take(&mut self.changes)
    }

    /// Find a node by ID
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a connection by ID
    pub fn connection(&self, id: &str) -> Option<&WorkflowConnection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Connections leaving a node, in insertion order
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a WorkflowConnection> + 'a {
        self.connections.iter().filter(move |c| c.source_node_id == node_id)
    }

    /// Connections entering a node, in insertion order
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a WorkflowConnection> + 'a {
        self.connections.iter().filter(move |c| c.target_node_id == node_id)
    }

    /// All trigger nodes, in insertion order
    pub fn trigger_nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.nodes.iter().filter(|n| n.node_type == NodeType::Trigger)
    }

    /// Topmost node whose box (`width` x `height`) contains a world point
    pub fn node_at(&self, point: Position, width: f64, height: f64) -> Option<&WorkflowNode> {
        // Later nodes paint on top, so search from the end.
        self.nodes.iter().rev().find(|n| {
            n.position.is_some_and(|p| {
                point.x >= p.x && point.x <= p.x + width && point.y >= p.y && point.y <= p.y + height
            })
        })
    }

    /// Append a node and return its generated ID
    ///
    /// The label comes from the static type/subtype table and the subtype
    /// is stored under the type's config key.
    pub fn add_node(&mut self, node_type: NodeType, position: Position, subtype: Option<&str>) -> NodeId {
        let id = format!("node-{}", uuid::Uuid::new_v4());
        let mut config = serde_json::Map::new();
        if let Some(subtype) = subtype {
            config.insert(
                node_type.subtype_key().to_string(),
                serde_json::Value::String(subtype.to_string()),
            );
        }

        self.nodes.push(WorkflowNode {
            id: id.clone(),
            node_type,
            position: Some(position),
            label: node_type.label_for(subtype).to_string(),
            config,
        });
        log::debug!("Added {:?} node '{}'", node_type, id);
        self.record(GraphChange::NodeAdded(id.clone()));
        id
    }

    /// Remove a node together with every connection touching it
    pub fn remove_node(&mut self, id: &str) -> Result<WorkflowNode, GraphError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;

        let node = self.nodes.remove(index);
        let mut removed = Vec::new();
        self.connections.retain(|c| {
            let touches = c.source_node_id == id || c.target_node_id == id;
            if touches {
                removed.push(c.id.clone());
            }
            !touches
        });

        log::debug!("Removed node '{}' and {} connection(s)", id, removed.len());
        self.record(GraphChange::NodeRemoved {
            node_id: node.id.clone(),
            connections: removed,
        });
        Ok(node)
    }

    /// Move a node; connections are derived from positions and stay as-is
    pub fn move_node(&mut self, id: &str, position: Position) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        node.position = Some(position);
        self.record(GraphChange::NodeMoved(id.to_string()));
        Ok(())
    }

    /// Replace a node's configuration
    pub fn update_node_config(
        &mut self,
        id: &str,
        config: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), GraphError> {
        self.node_mut(id)?.config = config;
        self.record(GraphChange::NodeUpdated(id.to_string()));
        Ok(())
    }

    /// Rename a node
    pub fn set_node_label(&mut self, id: &str, label: impl Into<String>) -> Result<(), GraphError> {
        self.node_mut(id)?.label = label.into();
        self.record(GraphChange::NodeUpdated(id.to_string()));
        Ok(())
    }

    /// Connect two nodes
    pub fn add_connection(&mut self, source_id: &str, target_id: &str) -> Result<ConnectionId, GraphError> {
        self.add_connection_with_handle(source_id, target_id, None)
    }

    /// Connect two nodes from a named source handle (e.g. a condition's `"true"` branch)
    ///
    /// Rejected, without touching the graph, when source equals target,
    /// when either node is missing, or when the ordered pair is already
    /// connected.
    pub fn add_connection_with_handle(
        &mut self,
        source_id: &str,
        target_id: &str,
        source_handle: Option<&str>,
    ) -> Result<ConnectionId, GraphError> {
        if source_id == target_id {
            return Err(GraphError::SelfConnection(source_id.to_string()));
        }
        for id in [source_id, target_id] {
            if self.node(id).is_none() {
                return Err(GraphError::NodeNotFound(id.to_string()));
            }
        }
        if self
            .connections
            .iter()
            .any(|c| c.source_node_id == source_id && c.target_node_id == target_id)
        {
            return Err(GraphError::DuplicateConnection {
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
            });
        }

        let id = format!("conn-{}", uuid::Uuid::new_v4());
        self.connections.push(WorkflowConnection {
            id: id.clone(),
            source_node_id: source_id.to_string(),
            target_node_id: target_id.to_string(),
            source_handle: source_handle.map(str::to_string),
            target_handle: None,
            label: source_handle.unwrap_or_default().to_string(),
        });
        log::debug!("Connected '{}' -> '{}' ({})", source_id, target_id, id);
        self.record(GraphChange::ConnectionAdded(id.clone()));
        Ok(id)
    }

    /// Remove one connection
    pub fn remove_connection(&mut self, id: &str) -> Result<WorkflowConnection, GraphError> {
        let index = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| GraphError::ConnectionNotFound(id.to_string()))?;
        let connection = self.connections.remove(index);
        self.record(GraphChange::ConnectionRemoved(connection.id.clone()));
        Ok(connection)
    }

    /// Return a node's position, writing a fallback back if it had none
    ///
    /// `fallback` receives the node's index in the graph so placement is
    /// deterministic. Repair happens at most once per node since the
    /// result is stored.
    pub fn position_or_repair(
        &mut self,
        id: &str,
        fallback: impl FnOnce(usize) -> Position,
    ) -> Result<Position, GraphError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;

        if let Some(position) = self.nodes[index].position {
            return Ok(position);
        }

        let position = fallback(index);
        self.nodes[index].position = Some(position);
        log::warn!(
            "Node '{}' had no position; placed at ({}, {})",
            id,
            position.x,
            position.y
        );
        self.record(GraphChange::PositionRepaired(id.to_string()));
        Ok(position)
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut WorkflowNode, GraphError> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    fn record(&mut self, change: GraphChange) {
        self.revision += 1;
        if let (GraphChange::NodeMoved(id), Some(GraphChange::NodeMoved(last))) =
            (&change, self.changes.last())
        {
            if id == last {
                return;
            }
        }
        if self.changes.len() >= change_log::CAPACITY {
            let excess = self.changes.len() + 1 - change_log::CAPACITY;
            self.changes.drain(..excess);
        }
        self.changes.push(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_nodes() -> (WorkflowGraph, NodeId, NodeId) {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_node(NodeType::Trigger, Position::new(0.0, 0.0), Some("ticket_created"));
        let b = graph.add_node(NodeType::Action, Position::new(300.0, 0.0), Some("assign_ticket"));
        (graph, a, b)
    }

    #[test]
    fn test_add_node_resolves_label_and_subtype() {
        let (graph, a, b) = two_nodes();
        let trigger = graph.node(&a).unwrap();
        assert_eq!(trigger.label, "Ticket Created");
        assert_eq!(trigger.subtype(), Some("ticket_created"));
        assert_eq!(graph.node(&b).unwrap().label, "Assign Ticket");
        assert_ne!(a, b);
    }

    #[test]
    fn test_self_connection_rejected() {
        let (mut graph, a, _) = two_nodes();
        let err = graph.add_connection(&a, &a).unwrap_err();
        assert_eq!(err, GraphError::SelfConnection(a));
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_duplicate_connection_rejected() {
        let (mut graph, a, b) = two_nodes();
        graph.add_connection(&a, &b).unwrap();
        let revision = graph.revision();

        let err = graph.add_connection(&a, &b).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateConnection { .. }));
        assert_eq!(graph.connections().len(), 1);
        assert_eq!(graph.revision(), revision);

        // The reverse direction is a different ordered pair
        graph.add_connection(&b, &a).unwrap();
        assert_eq!(graph.connections().len(), 2);
    }

    #[test]
    fn test_connection_to_missing_node_rejected() {
        let (mut graph, a, _) = two_nodes();
        let err = graph.add_connection(&a, "ghost").unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound("ghost".to_string()));
        let err = graph.add_connection("ghost", &a).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound("ghost".to_string()));
    }

    #[test]
    fn test_remove_node_removes_exactly_touching_connections() {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_node(NodeType::Trigger, Position::new(0.0, 0.0), None);
        let b = graph.add_node(NodeType::Action, Position::new(300.0, 0.0), None);
        let c = graph.add_node(NodeType::Action, Position::new(600.0, 0.0), None);
        let d = graph.add_node(NodeType::Action, Position::new(900.0, 0.0), None);
        graph.add_connection(&a, &b).unwrap();
        graph.add_connection(&b, &c).unwrap();
        graph.add_connection(&c, &d).unwrap();
        graph.add_connection(&a, &d).unwrap();

        let before = graph.connections().len();
        let touching = graph
            .connections()
            .iter()
            .filter(|c| c.source_node_id == b || c.target_node_id == b)
            .count();

        graph.remove_node(&b).unwrap();
        assert_eq!(before - graph.connections().len(), touching);
        assert!(graph
            .connections()
            .iter()
            .all(|c| c.source_node_id != b && c.target_node_id != b));
        assert!(graph.node(&b).is_none());
    }

    #[test]
    fn test_move_node_leaves_connections() {
        let (mut graph, a, b) = two_nodes();
        graph.add_connection(&a, &b).unwrap();
        let connections = graph.connections().to_vec();

        graph.move_node(&a, Position::new(50.0, 75.0)).unwrap();
        assert_eq!(graph.node(&a).unwrap().position, Some(Position::new(50.0, 75.0)));
        assert_eq!(graph.connections(), connections.as_slice());
    }

    #[test]
    fn test_changes_are_recorded_and_drained() {
        let (mut graph, a, b) = two_nodes();
        let conn = graph.add_connection(&a, &b).unwrap();
        graph.remove_connection(&conn).unwrap();

        let changes = graph.take_changes();
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[2], GraphChange::ConnectionAdded(conn.clone()));
        assert_eq!(changes[3], GraphChange::ConnectionRemoved(conn));
        assert!(graph.take_changes().is_empty());
        assert_eq!(graph.revision(), 4);
    }

    #[test]
    fn test_drag_moves_fold_into_one_change() {
        let (mut graph, a, b) = two_nodes();
        graph.take_changes();

        for step in 0..50 {
            graph.move_node(&a, Position::new(step as f64, 0.0)).unwrap();
        }
        graph.move_node(&b, Position::new(300.0, 10.0)).unwrap();
        graph.move_node(&a, Position::new(60.0, 0.0)).unwrap();

        assert_eq!(
            graph.take_changes(),
            vec![
                GraphChange::NodeMoved(a.clone()),
                GraphChange::NodeMoved(b),
                GraphChange::NodeMoved(a),
            ]
        );
        assert_eq!(graph.revision(), 54);
    }

    #[test]
    fn test_undrained_changes_are_capped() {
        let mut graph = WorkflowGraph::new();
        let total = change_log::CAPACITY + 10;
        for i in 0..total {
            graph.add_node(NodeType::Action, Position::new(i as f64, 0.0), None);
        }

        let changes = graph.take_changes();
        assert_eq!(changes.len(), change_log::CAPACITY);
        // The oldest entries were dropped
        assert_eq!(changes[0], GraphChange::NodeAdded(graph.nodes()[10].id.clone()));
        assert_eq!(
            changes.last(),
            Some(&GraphChange::NodeAdded(graph.nodes()[total - 1].id.clone()))
        );
        assert_eq!(graph.revision(), total as u64);
    }

    #[test]
    fn test_remove_missing_connection() {
        let (mut graph, _, _) = two_nodes();
        let err = graph.remove_connection("conn-x").unwrap_err();
        assert_eq!(err, GraphError::ConnectionNotFound("conn-x".to_string()));
    }

    #[test]
    fn test_position_repair_is_once_only() {
        let node = WorkflowNode {
            id: "broken".into(),
            node_type: NodeType::Action,
            position: None,
            label: "Broken".into(),
            config: serde_json::Map::new(),
        };
        let mut graph = WorkflowGraph::from_parts(vec![node], vec![]);

        let first = graph
            .position_or_repair("broken", |i| Position::new(100.0 + i as f64, 100.0))
            .unwrap();
        assert_eq!(first, Position::new(100.0, 100.0));

        let second = graph
            .position_or_repair("broken", |_| Position::new(-1.0, -1.0))
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(
            graph.take_changes(),
            vec![GraphChange::PositionRepaired("broken".into())]
        );
    }

    #[test]
    fn test_node_at_prefers_topmost() {
        let mut graph = WorkflowGraph::new();
        let _under = graph.add_node(NodeType::Action, Position::new(0.0, 0.0), None);
        let over = graph.add_node(NodeType::Action, Position::new(50.0, 20.0), None);

        let hit = graph.node_at(Position::new(60.0, 30.0), 200.0, 80.0).unwrap();
        assert_eq!(hit.id, over);
        assert!(graph.node_at(Position::new(1000.0, 1000.0), 200.0, 80.0).is_none());
    }

    #[test]
    fn test_serde_roundtrip_skips_bookkeeping() {
        let (mut graph, a, b) = two_nodes();
        graph.add_connection(&a, &b).unwrap();

        let json = serde_json::to_value(&graph).unwrap();
        assert!(json.get("revision").is_none());
        let restored: WorkflowGraph = serde_json::from_value(json).unwrap();
        assert_eq!(restored.nodes().len(), 2);
        assert_eq!(restored.connections().len(), 1);
        assert_eq!(restored.revision(), 0);
    }
}
