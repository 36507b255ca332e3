//! Core types for workflow graphs
//!
//! These types define workflows, their nodes and connections, templates,
//! and the static label table used when nodes are created.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::WorkflowGraph;
use crate::validation::{self, Severity};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Unique identifier for a workflow
pub type WorkflowId = String;

/// Unique identifier for a template
pub type TemplateId = String;

/// A point in world or screen space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// The kind of a workflow node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Starts a run when an external event occurs
    Trigger,
    /// Evaluates a predicate and branches
    Condition,
    /// Performs a side effect through a host handler
    Action,
    /// Waits on a human approval
    Approval,
    /// Notifies a person or channel
    Notification,
    /// Assigns work to an agent
    Assignment,
}

impl NodeType {
    /// Config key that holds this type's subtype (e.g. `triggerType`)
    pub fn subtype_key(&self) -> &'static str {
        match self {
            NodeType::Trigger => "triggerType",
            NodeType::Condition => "conditionType",
            NodeType::Action => "actionType",
            NodeType::Approval => "approvalType",
            NodeType::Notification => "notificationType",
            NodeType::Assignment => "assignmentType",
        }
    }

    /// Whether execution needs a subtype to pick a handler
    pub fn requires_subtype(&self) -> bool {
        matches!(self, NodeType::Trigger | NodeType::Condition | NodeType::Action)
    }

    /// Human-readable label for this node type
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::Trigger => "Trigger",
            NodeType::Condition => "Condition",
            NodeType::Action => "Action",
            NodeType::Approval => "Approval",
            NodeType::Notification => "Notification",
            NodeType::Assignment => "Assignment",
        }
    }

    /// Label for a node of this type with an optional subtype
    ///
    /// Unknown subtypes fall back to the type label.
    pub fn label_for(&self, subtype: Option<&str>) -> &'static str {
        let Some(subtype) = subtype else {
            return self.label();
        };
        SUBTYPE_LABELS
            .iter()
            .find(|(ty, key, _)| ty == self && *key == subtype)
            .map(|(_, _, label)| *label)
            .unwrap_or_else(|| self.label())
    }
}

/// Static (type, subtype, label) lookup table
const SUBTYPE_LABELS: &[(NodeType, &str, &str)] = &[
    (NodeType::Trigger, "ticket_created", "Ticket Created"),
    (NodeType::Trigger, "ticket_updated", "Ticket Updated"),
    (NodeType::Trigger, "customer_created", "Customer Created"),
    (NodeType::Trigger, "payment_received", "Payment Received"),
    (NodeType::Trigger, "sla_breached", "SLA Breached"),
    (NodeType::Trigger, "schedule", "Scheduled"),
    (NodeType::Condition, "priority_check", "Check Priority"),
    (NodeType::Condition, "status_check", "Check Status"),
    (NodeType::Condition, "customer_tier", "Customer Tier"),
    (NodeType::Condition, "business_hours", "Business Hours"),
    (NodeType::Action, "assign_ticket", "Assign Ticket"),
    (NodeType::Action, "send_email", "Send Email"),
    (NodeType::Action, "update_status", "Update Status"),
    (NodeType::Action, "add_tag", "Add Tag"),
    (NodeType::Action, "escalate", "Escalate"),
    (NodeType::Approval, "manager_approval", "Manager Approval"),
    (NodeType::Notification, "email", "Email Notification"),
    (NodeType::Notification, "sms", "SMS Notification"),
    (NodeType::Notification, "in_app", "In-App Notification"),
    (NodeType::Assignment, "round_robin", "Round Robin"),
    (NodeType::Assignment, "least_busy", "Least Busy Agent"),
];

/// A node instance in a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Unique identifier for this node within its graph
    pub id: NodeId,
    /// Node kind
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// World-space position of the node's top-left corner
    ///
    /// `None` only for records that arrived corrupted; the router
    /// repairs it on first encounter.
    #[serde(default)]
    pub position: Option<Position>,
    /// Display label
    #[serde(default)]
    pub label: String,
    /// Node configuration (holds the subtype key)
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowNode {
    /// The subtype string stored under this node type's config key
    pub fn subtype(&self) -> Option<&str> {
        self.config
            .get(self.node_type.subtype_key())
            .and_then(|v| v.as_str())
    }
}

/// A directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConnection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    /// Source handle; condition branches use `"true"` / `"false"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default)]
    pub label: String,
}

/// Lifecycle status of a workflow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Inactive,
    Archived,
}

/// A complete workflow record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: WorkflowStatus,
    pub graph: WorkflowGraph,
    #[serde(default)]
    pub trigger_config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Starts at 1 and grows with every structural save
    pub version: u32,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new draft workflow with an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_graph(name, WorkflowGraph::new())
    }

    /// Create a new draft workflow around an existing graph
    pub fn with_graph(name: impl Into<String>, graph: WorkflowGraph) -> Self {
        let now = Utc::now();
        Self {
            id: format!("wf-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            description: String::new(),
            category: String::new(),
            status: WorkflowStatus::Draft,
            graph,
            trigger_config: HashMap::new(),
            variables: HashMap::new(),
            version: 1,
            execution_count: 0,
            last_executed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record that the graph changed before a save
    pub fn touch_graph(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Swap in an edited graph, bumping the version if it changed
    ///
    /// Returns whether the version was bumped.
    pub fn replace_graph(&mut self, graph: WorkflowGraph) -> bool {
        let changed = graph.nodes() != self.graph.nodes()
            || graph.connections() != self.graph.connections();
        self.graph = graph;
        if changed {
            self.touch_graph();
        }
        changed
    }

    /// Record one completed run
    pub fn record_execution(&mut self, at: DateTime<Utc>) {
        self.execution_count += 1;
        self.last_executed_at = Some(at);
    }

    /// Make the workflow live
    ///
    /// Refused while validation reports errors; warnings are logged.
    pub fn activate(&mut self) -> Result<(), WorkflowError> {
        let issues = validation::validate_workflow(self);
        if !validation::is_runnable(&issues) {
            let errors: Vec<String> = issues
                .iter()
                .filter(|i| i.severity() == Severity::Error)
                .map(ToString::to_string)
                .collect();
            return Err(WorkflowError::Invalid(errors.join("; ")));
        }
        for issue in &issues {
            log::warn!("Workflow '{}': {}", self.name, issue);
        }
        self.set_status(WorkflowStatus::Active);
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.set_status(WorkflowStatus::Inactive);
    }

    pub fn archive(&mut self) {
        self.set_status(WorkflowStatus::Archived);
    }

    fn set_status(&mut self, status: WorkflowStatus) {
        if self.status != status {
            log::debug!("Workflow '{}' {:?} -> {:?}", self.id, self.status, status);
            self.status = status;
            self.updated_at = Utc::now();
        }
    }

    /// Summary row for listings
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            status: self.status,
            node_count: self.graph.nodes().len(),
            execution_count: self.execution_count,
            last_executed_at: self.last_executed_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing metadata for a stored workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub category: String,
    pub status: WorkflowStatus,
    pub node_count: usize,
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A reusable workflow blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Graph snapshot cloned into new workflows
    pub graph: WorkflowGraph,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub is_public: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_lookup() {
        assert_eq!(
            NodeType::Trigger.label_for(Some("ticket_created")),
            "Ticket Created"
        );
        assert_eq!(NodeType::Action.label_for(Some("assign_ticket")), "Assign Ticket");
        assert_eq!(NodeType::Action.label_for(Some("no_such_action")), "Action");
        assert_eq!(NodeType::Approval.label_for(None), "Approval");
        // Subtypes are scoped to their node type
        assert_eq!(NodeType::Action.label_for(Some("ticket_created")), "Action");
    }

    #[test]
    fn test_subtype_reads_type_specific_key() {
        let mut config = serde_json::Map::new();
        config.insert("actionType".into(), serde_json::json!("send_email"));
        config.insert("triggerType".into(), serde_json::json!("ticket_created"));
        let node = WorkflowNode {
            id: "n1".into(),
            node_type: NodeType::Action,
            position: Some(Position::new(0.0, 0.0)),
            label: String::new(),
            config,
        };
        assert_eq!(node.subtype(), Some("send_email"));
    }

    #[test]
    fn test_node_without_position_deserializes() {
        let node: WorkflowNode =
            serde_json::from_str(r#"{"id":"n1","type":"action","label":"Broken"}"#).unwrap();
        assert_eq!(node.position, None);
        assert_eq!(node.node_type, NodeType::Action);
    }

    #[test]
    fn test_new_workflow_defaults() {
        let wf = Workflow::new("Routing");
        assert!(wf.id.starts_with("wf-"));
        assert_eq!(wf.status, WorkflowStatus::Draft);
        assert_eq!(wf.version, 1);
        assert_eq!(wf.execution_count, 0);
        assert!(wf.last_executed_at.is_none());
    }

    #[test]
    fn test_activation_requires_valid_graph() {
        let mut wf = Workflow::new("Empty");
        let err = wf.activate().unwrap_err();
        assert!(matches!(err, WorkflowError::Invalid(_)));
        assert_eq!(wf.status, WorkflowStatus::Draft);

        wf.graph
            .add_node(NodeType::Trigger, Position::new(0.0, 0.0), Some("ticket_created"));
        wf.activate().unwrap();
        assert_eq!(wf.status, WorkflowStatus::Active);

        wf.deactivate();
        assert_eq!(wf.status, WorkflowStatus::Inactive);
        wf.archive();
        assert_eq!(wf.status, WorkflowStatus::Archived);
    }

    #[test]
    fn test_replace_graph_bumps_version_on_change() {
        let mut wf = Workflow::new("Versioned");
        assert!(!wf.replace_graph(WorkflowGraph::new()));
        assert_eq!(wf.version, 1);

        let mut graph = wf.graph.clone();
        graph.add_node(NodeType::Action, Position::new(10.0, 10.0), Some("add_tag"));
        assert!(wf.replace_graph(graph));
        assert_eq!(wf.version, 2);
    }

    #[test]
    fn test_serialization_shape() {
        let mut wf = Workflow::new("Shape");
        wf.status = WorkflowStatus::Active;
        let json = serde_json::to_value(&wf).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["executionCount"], 0);
        assert!(json.get("graph").is_some());
    }
}
