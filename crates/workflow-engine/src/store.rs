//! Workflow and template storage
//!
//! [`PersistenceGateway`] is the seam between the engine and whatever
//! stores workflows. [`WorkflowStore`] is the bundled implementation: an
//! in-memory map with optional JSON file persistence, laid out as
//!
//! ```text
//! <root>/workflows/<id>.json
//! <root>/templates/<id>.json
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use crate::config::StorageConfig;
use crate::constants::paths;
use crate::error::PersistenceError;
use crate::types::{TemplateId, Workflow, WorkflowId, WorkflowSummary, WorkflowTemplate};

/// Storage backend for workflows and templates
///
/// Errors are surfaced to the caller unchanged.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert or replace a workflow, returning its id
    async fn save(&self, workflow: &Workflow) -> Result<WorkflowId, PersistenceError>;

    async fn load(&self, id: &str) -> Result<Workflow, PersistenceError>;

    /// Summaries of every stored workflow, most recently updated first
    async fn list(&self) -> Result<Vec<WorkflowSummary>, PersistenceError>;

    async fn delete(&self, id: &str) -> Result<(), PersistenceError>;

    /// Insert or replace a template
    async fn save_template(&self, template: &WorkflowTemplate) -> Result<(), PersistenceError>;

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, PersistenceError>;

    /// Bump a template's usage count and return the new value
    async fn increment_usage(&self, template_id: &str) -> Result<u64, PersistenceError>;
}

/// In-memory store with optional JSON file persistence
///
/// # Example
///
/// ```ignore
/// let store = WorkflowStore::with_persistence("data");
/// let loaded = store.load_from_disk().await?;
/// store.save(&workflow).await?;
/// ```
#[derive(Debug, Default)]
pub struct WorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    templates: RwLock<HashMap<TemplateId, WorkflowTemplate>>,
    /// Root directory for persistence; `None` keeps everything in memory
    root: Option<PathBuf>,
}

impl WorkflowStore {
    /// Create a new in-memory store without persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists under the given directory.
    ///
    /// Directories are created on first save.
    pub fn with_persistence(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        match &config.data_dir {
            Some(dir) => Self::with_persistence(dir),
            None => Self::new(),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Load workflows and templates from the persistence directory
    ///
    /// Files that fail to parse are logged and skipped. Returns the number
    /// of records loaded.
    pub async fn load_from_disk(&self) -> Result<usize, PersistenceError> {
        let Some(root) = &self.root else {
            return Ok(0);
        };

        let workflows: Vec<Workflow> = read_records(&root.join(paths::WORKFLOWS_DIR)).await?;
        let templates: Vec<WorkflowTemplate> = read_records(&root.join(paths::TEMPLATES_DIR)).await?;
        let count = workflows.len() + templates.len();

        {
            let mut map = self.workflows.write();
            for workflow in workflows {
                map.insert(workflow.id.clone(), workflow);
            }
        }
        {
            let mut map = self.templates.write();
            for template in templates {
                map.insert(template.id.clone(), template);
            }
        }

        log::info!("Loaded {} record(s) from {:?}", count, root);
        Ok(count)
    }

    /// File backing a record, or `None` when the store is in memory
    ///
    /// Ids are checked even without a root so both modes accept the same ids.
    fn record_path(&self, dir: &str, id: &str) -> Result<Option<PathBuf>, PersistenceError> {
        check_record_id(id)?;
        Ok(self
            .root
            .as_ref()
            .map(|root| root.join(dir).join(format!("{}.json", id))))
    }
}

#[async_trait]
impl PersistenceGateway for WorkflowStore {
    async fn save(&self, workflow: &Workflow) -> Result<WorkflowId, PersistenceError> {
        if let Some(path) = self.record_path(paths::WORKFLOWS_DIR, &workflow.id)? {
            write_record(&path, workflow).await?;
        }
        self.workflows
            .write()
            .insert(workflow.id.clone(), workflow.clone());
        Ok(workflow.id.clone())
    }

    async fn load(&self, id: &str) -> Result<Workflow, PersistenceError> {
        self.workflows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>, PersistenceError> {
        let mut summaries: Vec<WorkflowSummary> =
            self.workflows.read().values().map(Workflow::summary).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        let path = self.record_path(paths::WORKFLOWS_DIR, id)?;
        let removed = self.workflows.write().remove(id);
        if removed.is_none() {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        if let Some(path) = path {
            if path.exists() {
                fs::remove_file(&path).await?;
                log::debug!("Deleted workflow '{}' from {:?}", id, path);
            }
        }
        Ok(())
    }

    async fn save_template(&self, template: &WorkflowTemplate) -> Result<(), PersistenceError> {
        if let Some(path) = self.record_path(paths::TEMPLATES_DIR, &template.id)? {
            write_record(&path, template).await?;
        }
        self.templates
            .write()
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, PersistenceError> {
        let mut templates: Vec<WorkflowTemplate> = self.templates.read().values().cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(templates)
    }

    async fn increment_usage(&self, template_id: &str) -> Result<u64, PersistenceError> {
        let path = self.record_path(paths::TEMPLATES_DIR, template_id)?;
        let updated = {
            let mut map = self.templates.write();
            let template = map
                .get_mut(template_id)
                .ok_or_else(|| PersistenceError::NotFound(template_id.to_string()))?;
            template.usage_count += 1;
            template.clone()
        };

        if let Some(path) = path {
            write_record(&path, &updated).await?;
        }
        Ok(updated.usage_count)
    }
}

/// Reject ids that would escape the record directory
fn check_record_id(id: &str) -> Result<(), PersistenceError> {
    let escapes = id.is_empty()
        || id == "."
        || id.contains("..")
        || id.contains(['/', '\\', '\0']);
    if escapes {
        return Err(PersistenceError::InvalidId(id.to_string()));
    }
    Ok(())
}

async fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<(), PersistenceError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    let content = serde_json::to_string_pretty(record)?;
    fs::write(path, content).await?;
    log::debug!("Saved {:?}", path);
    Ok(())
}

async fn read_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, PersistenceError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "json") {
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<T>(&content) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping unreadable record {:?}: {}", path, e),
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use tempfile::TempDir;

    fn sample_workflow(name: &str) -> Workflow {
        let graph = WorkflowBuilder::new()
            .trigger("t", "ticket_created", (100.0, 100.0))
            .action("a", "assign_ticket", (400.0, 100.0))
            .connect("t", "a")
            .build();
        Workflow::with_graph(name, graph)
    }

    fn sample_template() -> WorkflowTemplate {
        WorkflowTemplate {
            id: "tpl-routing".into(),
            name: "Routing".into(),
            description: String::new(),
            category: "support".into(),
            graph: WorkflowBuilder::new()
                .trigger("t", "ticket_created", (100.0, 100.0))
                .build(),
            usage_count: 0,
            is_public: true,
        }
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = WorkflowStore::new();
        let wf = sample_workflow("Memory");
        assert_eq!(store.save(&wf).await.unwrap(), wf.id);

        let loaded = store.load(&wf.id).await.unwrap();
        assert_eq!(loaded.name, "Memory");
        assert_eq!(loaded.graph.nodes().len(), 2);

        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].node_count, 2);

        store.delete(&wf.id).await.unwrap();
        assert!(matches!(
            store.load(&wf.id).await,
            Err(PersistenceError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&wf.id).await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persistent_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let wf = sample_workflow("Persisted");
        {
            let store = WorkflowStore::with_persistence(temp_dir.path());
            store.save(&wf).await.unwrap();
            store.save_template(&sample_template()).await.unwrap();
        }
        assert!(temp_dir
            .path()
            .join("workflows")
            .join(format!("{}.json", wf.id))
            .exists());

        let store = WorkflowStore::with_persistence(temp_dir.path());
        assert_eq!(store.load_from_disk().await.unwrap(), 2);
        let loaded = store.load(&wf.id).await.unwrap();
        assert_eq!(loaded.graph.connections().len(), 1);
        assert_eq!(loaded.created_at, wf.created_at);
        assert_eq!(store.list_templates().await.unwrap()[0].id, "tpl-routing");
    }

    #[tokio::test]
    async fn test_unparsable_files_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("workflows");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.json"), "{ nope").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let store = WorkflowStore::with_persistence(temp_dir.path());
        store.save(&sample_workflow("Good")).await.unwrap();

        let fresh = WorkflowStore::with_persistence(temp_dir.path());
        assert_eq!(fresh.load_from_disk().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_usage_persists() {
        let temp_dir = TempDir::new().unwrap();
        let store = WorkflowStore::with_persistence(temp_dir.path());
        store.save_template(&sample_template()).await.unwrap();

        assert_eq!(store.increment_usage("tpl-routing").await.unwrap(), 1);
        assert_eq!(store.increment_usage("tpl-routing").await.unwrap(), 2);
        assert!(matches!(
            store.increment_usage("tpl-missing").await,
            Err(PersistenceError::NotFound(_))
        ));

        let fresh = WorkflowStore::with_persistence(temp_dir.path());
        fresh.load_from_disk().await.unwrap();
        assert_eq!(fresh.list_templates().await.unwrap()[0].usage_count, 2);
    }

    #[tokio::test]
    async fn test_list_orders_by_recent_update() {
        let store = WorkflowStore::new();
        let older = sample_workflow("Older");
        let mut newer = sample_workflow("Newer");
        newer.updated_at = older.updated_at + chrono::Duration::seconds(5);
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Newer", "Older"]);
    }

    #[tokio::test]
    async fn test_from_config_without_dir_is_in_memory() {
        let store = WorkflowStore::from_config(&StorageConfig { data_dir: None });
        assert!(store.root().is_none());
        assert_eq!(store.load_from_disk().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ids_that_escape_the_root_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("data");
        let store = WorkflowStore::with_persistence(&root);

        let mut wf = sample_workflow("Escaping");
        wf.id = "../escaped".into();
        assert!(matches!(
            store.save(&wf).await,
            Err(PersistenceError::InvalidId(_))
        ));
        assert!(!temp_dir.path().join("escaped.json").exists());
        assert!(!root.join("escaped.json").exists());
        assert!(store.list().await.unwrap().is_empty());

        let mut template = sample_template();
        template.id = "nested/tpl".into();
        assert!(matches!(
            store.save_template(&template).await,
            Err(PersistenceError::InvalidId(_))
        ));
        assert!(matches!(
            store.delete("..").await,
            Err(PersistenceError::InvalidId(_))
        ));
    }

    #[test]
    fn test_check_record_id() {
        assert!(check_record_id("tpl-routing").is_ok());
        assert!(check_record_id("2f1c0e4a-workflow").is_ok());
        for bad in ["", ".", "..", "../x", "a/b", "a\\b", "a..b"] {
            assert!(check_record_id(bad).is_err(), "{bad:?} accepted");
        }
    }
}
