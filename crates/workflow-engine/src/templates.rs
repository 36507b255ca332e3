//! Workflow templates
//!
//! Instantiating a template deep-clones its graph into a new draft
//! workflow. Every node and connection gets a fresh id so two workflows
//! made from the same template never share ids.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::WorkflowBuilder;
use crate::constants::handles;
use crate::error::Result;
use crate::graph::WorkflowGraph;
use crate::store::PersistenceGateway;
use crate::types::{NodeId, NodeType, Workflow, WorkflowConnection, WorkflowNode, WorkflowTemplate};

/// Builds workflows from templates and records template usage
#[derive(Clone)]
pub struct TemplateInstantiator {
    gateway: Arc<dyn PersistenceGateway>,
}

impl TemplateInstantiator {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }

    /// Create a new draft workflow from a template
    ///
    /// The template's usage count is incremented through the gateway and
    /// the stored count is mirrored into `template`. The workflow is not
    /// saved.
    pub async fn instantiate(&self, template: &mut WorkflowTemplate) -> Result<Workflow> {
        let mut workflow = Workflow::with_graph(template.name.clone(), remap_graph(&template.graph));
        workflow.description = template.description.clone();
        workflow.category = template.category.clone();

        template.usage_count = self.gateway.increment_usage(&template.id).await?;
        log::info!(
            "Instantiated template '{}' as workflow {} (used {} time(s))",
            template.id,
            workflow.id,
            template.usage_count
        );
        Ok(workflow)
    }

    /// Save a workflow's graph as a new template
    pub async fn capture_and_save(&self, workflow: &Workflow, is_public: bool) -> Result<WorkflowTemplate> {
        let template = capture(workflow, is_public);
        self.gateway.save_template(&template).await?;
        Ok(template)
    }

    /// Store the built-in templates that are not stored yet
    ///
    /// Returns how many were added.
    pub async fn seed_builtin(&self) -> Result<usize> {
        let existing = self.gateway.list_templates().await?;
        let mut added = 0;
        for template in builtin_templates() {
            if existing.iter().all(|t| t.id != template.id) {
                self.gateway.save_template(&template).await?;
                added += 1;
            }
        }
        log::debug!("Seeded {} built-in template(s)", added);
        Ok(added)
    }
}

/// Template holding a copy of a workflow's graph
pub fn capture(workflow: &Workflow, is_public: bool) -> WorkflowTemplate {
    WorkflowTemplate {
        id: format!("tpl-{}", uuid::Uuid::new_v4()),
        name: workflow.name.clone(),
        description: workflow.description.clone(),
        category: workflow.category.clone(),
        graph: WorkflowGraph::from_parts(
            workflow.graph.nodes().to_vec(),
            workflow.graph.connections().to_vec(),
        ),
        usage_count: 0,
        is_public,
    }
}

/// Copy of a graph with fresh node and connection ids
///
/// Connection endpoints are rewritten to the new node ids. Connections
/// whose endpoints are not in the graph are dropped.
pub fn remap_graph(graph: &WorkflowGraph) -> WorkflowGraph {
    let ids: HashMap<&str, NodeId> = graph
        .nodes()
        .iter()
        .map(|n| (n.id.as_str(), format!("node-{}", uuid::Uuid::new_v4())))
        .collect();

    let nodes = graph
        .nodes()
        .iter()
        .map(|n| WorkflowNode {
            id: ids[n.id.as_str()].clone(),
            ..n.clone()
        })
        .collect();

    let connections = graph
        .connections()
        .iter()
        .filter_map(|c| {
            let source = ids.get(c.source_node_id.as_str());
            let target = ids.get(c.target_node_id.as_str());
            match (source, target) {
                (Some(source), Some(target)) => Some(WorkflowConnection {
                    id: format!("conn-{}", uuid::Uuid::new_v4()),
                    source_node_id: source.clone(),
                    target_node_id: target.clone(),
                    ..c.clone()
                }),
                _ => {
                    log::warn!("Dropping dangling template connection '{}'", c.id);
                    None
                }
            }
        })
        .collect();

    WorkflowGraph::from_parts(nodes, connections)
}

/// Ticket-routing presets shipped with the engine
pub fn builtin_templates() -> Vec<WorkflowTemplate> {
    vec![
        WorkflowTemplate {
            id: "tpl-auto-assign".into(),
            name: "Auto-assign new tickets".into(),
            description: "Assign every new ticket to an available agent".into(),
            category: "routing".into(),
            graph: WorkflowBuilder::new()
                .trigger("trigger", "ticket_created", (100.0, 100.0))
                .action("assign", "assign_ticket", (400.0, 100.0))
                .connect("trigger", "assign")
                .build(),
            usage_count: 0,
            is_public: true,
        },
        WorkflowTemplate {
            id: "tpl-priority-escalation".into(),
            name: "Escalate high priority".into(),
            description: "Escalate high-priority tickets, assign the rest".into(),
            category: "routing".into(),
            graph: WorkflowBuilder::new()
                .trigger("trigger", "ticket_created", (100.0, 200.0))
                .condition("priority", "priority_check", (400.0, 200.0))
                .with_config(serde_json::json!({ "priority": "high" }))
                .action("escalate", "escalate", (700.0, 100.0))
                .action("assign", "assign_ticket", (700.0, 300.0))
                .connect("trigger", "priority")
                .connect_from("priority", handles::TRUE, "escalate")
                .connect_from("priority", handles::FALSE, "assign")
                .build(),
            usage_count: 0,
            is_public: true,
        },
        WorkflowTemplate {
            id: "tpl-sla-breach".into(),
            name: "SLA breach alert".into(),
            description: "Notify the team and escalate when an SLA is breached".into(),
            category: "sla".into(),
            graph: WorkflowBuilder::new()
                .trigger("trigger", "sla_breached", (100.0, 100.0))
                .add_node("notify", NodeType::Notification, Some("email"), (400.0, 100.0))
                .action("escalate", "escalate", (700.0, 100.0))
                .connect("trigger", "notify")
                .connect("notify", "escalate")
                .build(),
            usage_count: 0,
            is_public: true,
        },
    ]
}
