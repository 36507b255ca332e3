//! Whole-graph validation
//!
//! The mutation API keeps a graph valid as it is edited, but graphs loaded
//! from storage or templates bypass it. These checks collect every issue
//! found rather than stopping at the first.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::WorkflowGraph;
use crate::types::Workflow;

/// How serious a validation issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The workflow cannot be activated
    Error,
    /// Legal, but the engine resolves it with first-found semantics
    Warning,
}

/// A single problem found in a graph
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    /// Two nodes share an ID
    DuplicateNodeId { node_id: String },
    /// A connection references a missing node
    UnknownNode {
        connection_id: String,
        node_id: String,
    },
    /// A connection starts and ends on the same node
    SelfConnection { connection_id: String },
    /// Two connections join the same ordered pair
    DuplicateConnection {
        connection_id: String,
        source_id: String,
        target_id: String,
    },
    /// No trigger node to start a run from
    MissingTrigger,
    /// More than one trigger; the first one wins
    MultipleTriggers { count: usize },
    /// A non-condition node has several outgoing connections; the first one wins
    AmbiguousNext { node_id: String, count: usize },
    /// A node lacks a position and will be placed automatically
    MissingPosition { node_id: String },
    /// A node has no configured subtype
    MissingSubtype { node_id: String, key: &'static str },
    /// The graph contains a cycle
    CycleDetected,
}

impl ValidationIssue {
    pub fn severity(&self) -> Severity {
        match self {
            Self::MultipleTriggers { .. }
            | Self::AmbiguousNext { .. }
            | Self::MissingPosition { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownNode {
                connection_id,
                node_id,
            } => write!(
                f,
                "Connection '{}' references unknown node '{}'",
                connection_id, node_id
            ),
            Self::SelfConnection { connection_id } => {
                write!(f, "Connection '{}' connects a node to itself", connection_id)
            }
            Self::DuplicateConnection {
                connection_id,
                source_id,
                target_id,
            } => write!(
                f,
                "Connection '{}' duplicates '{}' -> '{}'",
                connection_id, source_id, target_id
            ),
            Self::MissingTrigger => write!(f, "Workflow has no trigger node"),
            Self::MultipleTriggers { count } => {
                write!(f, "Workflow has {} trigger nodes; only the first runs", count)
            }
            Self::AmbiguousNext { node_id, count } => write!(
                f,
                "Node '{}' has {} outgoing connections; only the first is followed",
                node_id, count
            ),
            Self::MissingPosition { node_id } => write!(f, "Node '{}' has no position", node_id),
            Self::MissingSubtype { node_id, key } => {
                write!(f, "Node '{}' is missing '{}'", node_id, key)
            }
            Self::CycleDetected => write!(f, "Cycle detected in graph"),
        }
    }
}

/// Validate a workflow graph
///
/// Returns all issues found, errors and warnings alike.
pub fn validate_graph(graph: &WorkflowGraph) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    validate_nodes(graph, &mut issues);
    validate_connections(graph, &mut issues);
    validate_triggers(graph, &mut issues);
    validate_fan_out(graph, &mut issues);
    detect_cycles(graph, &mut issues);

    issues
}

/// Validate a workflow's graph
pub fn validate_workflow(workflow: &Workflow) -> Vec<ValidationIssue> {
    validate_graph(&workflow.graph)
}

/// True when none of the issues is an error
pub fn is_runnable(issues: &[ValidationIssue]) -> bool {
    issues.iter().all(|i| i.severity() != Severity::Error)
}

fn validate_nodes(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for node in graph.nodes() {
        if !seen.insert(node.id.as_str()) {
            issues.push(ValidationIssue::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
        if node.position.is_none() {
            issues.push(ValidationIssue::MissingPosition {
                node_id: node.id.clone(),
            });
        }
        if node.subtype().is_none() && node.node_type.requires_subtype() {
            issues.push(ValidationIssue::MissingSubtype {
                node_id: node.id.clone(),
                key: node.node_type.subtype_key(),
            });
        }
    }
}

/// Check endpoint references, self-loops and duplicate pairs
fn validate_connections(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    let node_ids: HashSet<&str> = graph.nodes().iter().map(|n| n.id.as_str()).collect();
    let mut pairs = HashSet::new();

    for conn in graph.connections() {
        for endpoint in [&conn.source_node_id, &conn.target_node_id] {
            if !node_ids.contains(endpoint.as_str()) {
                issues.push(ValidationIssue::UnknownNode {
                    connection_id: conn.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
        if conn.source_node_id == conn.target_node_id {
            issues.push(ValidationIssue::SelfConnection {
                connection_id: conn.id.clone(),
            });
        }
        if !pairs.insert((conn.source_node_id.as_str(), conn.target_node_id.as_str())) {
            issues.push(ValidationIssue::DuplicateConnection {
                connection_id: conn.id.clone(),
                source_id: conn.source_node_id.clone(),
                target_id: conn.target_node_id.clone(),
            });
        }
    }
}

fn validate_triggers(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    match graph.trigger_nodes().count() {
        0 => issues.push(ValidationIssue::MissingTrigger),
        1 => {}
        count => issues.push(ValidationIssue::MultipleTriggers { count }),
    }
}

fn validate_fan_out(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    for node in graph.nodes() {
        if node.node_type == crate::types::NodeType::Condition {
            continue;
        }
        let count = graph.outgoing(&node.id).count();
        if count > 1 {
            issues.push(ValidationIssue::AmbiguousNext {
                node_id: node.id.clone(),
                count,
            });
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn detect_cycles(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    let mut in_degree: HashMap<&str, usize> = graph
        .nodes()
        .iter()
        .map(|n| (n.id.as_str(), graph.incoming(&n.id).count()))
        .collect();

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for conn in graph.outgoing(node_id) {
            if let Some(deg) = in_degree.get_mut(conn.target_node_id.as_str()) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(&conn.target_node_id);
                }
            }
        }
    }

    if visited < in_degree.len() {
        issues.push(ValidationIssue::CycleDetected);
    }
}
