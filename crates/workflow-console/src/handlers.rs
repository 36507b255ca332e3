//! Demo handlers for the built-in templates
//!
//! They only shape JSON; nothing leaves the process.

use serde_json::{json, Value};
use workflow_engine::{ExecutionContext, HandlerRegistry, HandlerResult, WorkflowNode};

const AGENTS: &[&str] = &["ana", "bo", "chen"];

pub fn demo_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    for trigger_type in ["ticket_created", "ticket_updated", "sla_breached"] {
        registry.register_trigger_fn(trigger_type, |_node, payload| async move { Ok(payload) });
    }

    registry.register_action_fn("assign_ticket", |_node, ctx| async move {
        let ticket = ctx.get("ticketId").and_then(Value::as_u64).unwrap_or(0);
        let agent = AGENTS[(ticket as usize) % AGENTS.len()];
        log::info!("Assigning ticket {} to {}", ticket, agent);
        Ok(json!({ "agent": agent }))
    });
    registry.register_action_fn("escalate", |_node, ctx| async move {
        Ok(json!({ "escalated": ctx.get("ticketId").cloned().unwrap_or(Value::Null), "tier": 2 }))
    });
    registry.register_action_fn("send_email", |node, _ctx| async move {
        let template = node.config.get("template").cloned().unwrap_or(json!("default"));
        Ok(json!({ "queued": true, "template": template }))
    });
    registry.register_action_fn("update_status", |node, _ctx| async move {
        Ok(json!({ "status": node.config.get("status").cloned().unwrap_or(json!("pending")) }))
    });
    registry.register_action_fn("add_tag", |node, _ctx| async move {
        Ok(json!({ "tag": node.config.get("tag").cloned().unwrap_or(json!("workflow")) }))
    });

    registry.register_condition_fn("priority_check", |node, ctx| config_matches(node, ctx, "priority"));
    registry.register_condition_fn("status_check", |node, ctx| config_matches(node, ctx, "status"));
    registry.register_condition_fn("customer_tier", |node, ctx| config_matches(node, ctx, "tier"));

    registry
}

/// True when the node's config value for `key` equals the context's
fn config_matches(node: &WorkflowNode, ctx: &ExecutionContext, key: &str) -> HandlerResult<bool> {
    Ok(match node.config.get(key) {
        Some(expected) => ctx.get(key) == Some(expected),
        None => false,
    })
}
