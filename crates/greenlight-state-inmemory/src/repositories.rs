//! DashMap-backed repositories with optimistic concurrency.
//!
//! Flow instances carry a version stamp: `save` checks the stored version
//! against the aggregate's and bumps it, so two writers racing on the same
//! instance surface a `ConcurrencyConflict` instead of silently losing one
//! write. The loser reloads and retries.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use greenlight_core::domain::node_instance::NodeInstanceId;
use greenlight_core::{
    CoreError, DocumentId, FlowDefId, FlowDefinition, FlowDefinitionRepository, FlowInstance,
    FlowInstanceId, FlowInstanceRepository,
};

/// In-memory flow instance repository with sequential id assignment and
/// versioned writes
pub struct InMemoryFlowInstanceRepository {
    instances: DashMap<i64, FlowInstance>,
    next_instance_id: AtomicI64,
    next_node_instance_id: AtomicI64,
}

impl InMemoryFlowInstanceRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            instances: DashMap::with_capacity(64),
            next_instance_id: AtomicI64::new(1),
            next_node_instance_id: AtomicI64::new(1),
        }
    }

    /// Number of stored instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the repository is empty
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Default for InMemoryFlowInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowInstanceRepository for InMemoryFlowInstanceRepository {
    async fn find_by_id(&self, id: FlowInstanceId) -> Result<Option<FlowInstance>, CoreError> {
        Ok(self.instances.get(&id.0).map(|entry| entry.clone()))
    }

    async fn save(&self, instance: &mut FlowInstance) -> Result<FlowInstanceId, CoreError> {
        let id = match instance.id() {
            Some(id) => id,
            None => FlowInstanceId(self.next_instance_id.fetch_add(1, Ordering::SeqCst)),
        };
        let mut next_node_id =
            || NodeInstanceId(self.next_node_instance_id.fetch_add(1, Ordering::SeqCst));
        instance.bind_storage_ids(id, &mut next_node_id);

        let expected = instance.version();
        match self.instances.entry(id.0) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let stored = entry.get().version();
                if stored != expected {
                    return Err(CoreError::ConcurrencyConflict(format!(
                        "flow instance {} was modified concurrently (stored version {}, expected {})",
                        id.0, stored, expected
                    )));
                }
                instance.set_version(expected + 1);
                entry.insert(instance.clone());
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                instance.set_version(1);
                entry.insert(instance.clone());
            }
        }

        debug!(flow_instance_id = id.0, version = instance.version(), "flow instance saved");
        Ok(id)
    }

    async fn delete(&self, id: FlowInstanceId) -> Result<(), CoreError> {
        self.instances.remove(&id.0);
        Ok(())
    }

    async fn list_by_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<FlowInstance>, CoreError> {
        Ok(self
            .instances
            .iter()
            .filter(|entry| entry.document_id() == document_id)
            .map(|entry| entry.clone())
            .collect())
    }
}

/// In-memory flow definition repository
pub struct InMemoryFlowDefinitionRepository {
    definitions: DashMap<i64, FlowDefinition>,
}

impl InMemoryFlowDefinitionRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            definitions: DashMap::new(),
        }
    }

    /// Create a repository preloaded with definitions
    pub fn with_definitions(definitions: Vec<FlowDefinition>) -> Self {
        let repo = Self::new();
        for definition in definitions {
            repo.definitions.insert(definition.id.0, definition);
        }
        repo
    }
}

impl Default for InMemoryFlowDefinitionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowDefinitionRepository for InMemoryFlowDefinitionRepository {
    async fn find_by_id(&self, id: FlowDefId) -> Result<Option<FlowDefinition>, CoreError> {
        Ok(self.definitions.get(&id.0).map(|entry| entry.clone()))
    }

    async fn save(&self, definition: &FlowDefinition) -> Result<(), CoreError> {
        self.definitions.insert(definition.id.0, definition.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FlowDefinition>, CoreError> {
        Ok(self.definitions.iter().map(|entry| entry.clone()).collect())
    }
}
