//! Headless workflow host
//!
//! Loads configuration, seeds the built-in templates into the store,
//! instantiates one of them and runs it once against demo handlers.
//!
//! ```text
//! workflow-console [config.json] [template-id] [payload-json]
//! ```

mod handlers;

use std::error::Error;
use std::sync::Arc;

use serde_json::json;
use workflow_engine::{
    ExecutionEngine, LogEventSink, PersistenceGateway, TemplateInstantiator, WorkflowConfig,
    WorkflowHandle, WorkflowStore,
};

const DEFAULT_CONFIG: &str = "workflow-config.json";
const DEFAULT_TEMPLATE: &str = "tpl-priority-escalation";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Workflow console starting...");

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let template_id = args.next().unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
    let payload = match args.next() {
        Some(raw) => serde_json::from_str(&raw)?,
        None => json!({ "ticketId": 1042, "priority": "high", "status": "open" }),
    };

    let config = WorkflowConfig::load(&config_path).await?;
    let store = Arc::new(WorkflowStore::from_config(&config.storage));
    store.load_from_disk().await?;

    let instantiator = TemplateInstantiator::new(store.clone());
    instantiator.seed_builtin().await?;

    let mut template = store
        .list_templates()
        .await?
        .into_iter()
        .find(|t| t.id == template_id)
        .ok_or_else(|| format!("Unknown template '{}'", template_id))?;

    let mut workflow = instantiator.instantiate(&mut template).await?;
    workflow.activate()?;
    store.save(&workflow).await?;

    let engine = ExecutionEngine::new(Arc::new(handlers::demo_registry()), &config.engine);
    let handle = WorkflowHandle::new(workflow);

    match engine.run(&handle, payload, &LogEventSink).await {
        Ok(trace) => {
            for step in &trace.steps {
                log::info!("  {} [{:?}] -> {}", step.node_id, step.node_type, step.result);
            }
        }
        Err(failure) => {
            log::warn!(
                "Run failed at {:?} after {} step(s): {}",
                failure.failed_node,
                failure.trace.len(),
                failure.error
            );
        }
    }
    store.save(&handle.snapshot()).await?;

    for summary in store.list().await? {
        log::info!(
            "{} '{}' [{:?}] nodes={} runs={}",
            summary.id,
            summary.name,
            summary.status,
            summary.node_count,
            summary.execution_count
        );
    }
    Ok(())
}
