//! Repository and collaborator traits for the Greenlight core
//!
//! This module defines the interfaces the core consumes at its boundary.
//! External crates implement them to provide persistence, identity
//! resolution, and event delivery; the core itself performs no I/O outside
//! these seams.

use async_trait::async_trait;

use super::approver::{Approver, DeptId, RoleId, UserId};
use super::events::DomainEvent;
use super::flow_definition::FlowDefinition;
use super::flow_instance::{DocumentId, FlowDefId, FlowInstance, FlowInstanceId};
use crate::CoreError;

/// Load/save interface for flow instance aggregates.
///
/// The aggregate is the unit of consistency: implementations must give the
/// caller exclusive logical write access for a load→mutate→save cycle,
/// either by locking or by an optimistic version stamp checked on save
/// (conflict surfaces as [`CoreError::ConcurrencyConflict`], and the caller
/// retries from a fresh load).
#[async_trait]
pub trait FlowInstanceRepository: Send + Sync {
    /// Find a flow instance by ID
    async fn find_by_id(&self, id: FlowInstanceId) -> Result<Option<FlowInstance>, CoreError>;

    /// Save a flow instance, assigning storage ids to the aggregate and its
    /// node instances on first save. Returns the instance id.
    async fn save(&self, instance: &mut FlowInstance) -> Result<FlowInstanceId, CoreError>;

    /// Delete a flow instance
    async fn delete(&self, id: FlowInstanceId) -> Result<(), CoreError>;

    /// Find all flow instances attached to a document
    async fn list_by_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<FlowInstance>, CoreError>;
}

/// Load/save interface for flow definitions
#[async_trait]
pub trait FlowDefinitionRepository: Send + Sync {
    /// Find a flow definition by ID
    async fn find_by_id(&self, id: FlowDefId) -> Result<Option<FlowDefinition>, CoreError>;

    /// Save a flow definition
    async fn save(&self, definition: &FlowDefinition) -> Result<(), CoreError>;

    /// List all flow definitions
    async fn list(&self) -> Result<Vec<FlowDefinition>, CoreError>;
}

/// Resolution interface turning assignment configuration into concrete
/// approvers. Ids that cannot be resolved are simply absent from the result;
/// strategies decide whether an empty result is an error.
#[async_trait]
pub trait ApproverProvider: Send + Sync {
    /// Resolve users into approvers
    async fn approvers_by_user_ids(&self, user_ids: &[UserId]) -> Result<Vec<Approver>, CoreError>;

    /// Resolve the leaders of the given departments
    async fn dept_leaders_by_dept_ids(
        &self,
        dept_ids: &[DeptId],
    ) -> Result<Vec<Approver>, CoreError>;

    /// Resolve every member of the given roles
    async fn users_by_role_ids(&self, role_ids: &[RoleId]) -> Result<Vec<Approver>, CoreError>;
}

/// Event sink receiving accumulated domain events after persistence.
///
/// Delivery is best-effort and does not participate in the business
/// transaction: callers catch a returned error, log it, and move on.
#[async_trait]
pub trait DomainEventPublisher: Send + Sync {
    /// Publish a single domain event
    async fn publish(&self, event: &dyn DomainEvent) -> Result<(), CoreError>;
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use crate::domain::node_instance::NodeInstanceId;

    /// Simple in-memory flow instance repository. Assigns sequential ids and
    /// writes last-write-wins; the versioned store lives in the state crate.
    pub struct MemoryFlowInstanceRepository {
        instances: DashMap<i64, FlowInstance>,
        next_instance_id: AtomicI64,
        next_node_instance_id: AtomicI64,
    }

    impl MemoryFlowInstanceRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self {
                instances: DashMap::with_capacity(16),
                next_instance_id: AtomicI64::new(1),
                next_node_instance_id: AtomicI64::new(1),
            }
        }
    }

    impl Default for MemoryFlowInstanceRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl FlowInstanceRepository for MemoryFlowInstanceRepository {
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

            self.instances.insert(id.0, instance.clone());
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

    /// Simple in-memory flow definition repository
    pub struct MemoryFlowDefinitionRepository {
        definitions: DashMap<i64, FlowDefinition>,
    }

    impl MemoryFlowDefinitionRepository {
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

    impl Default for MemoryFlowDefinitionRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl FlowDefinitionRepository for MemoryFlowDefinitionRepository {
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

    /// Publisher that records event types for assertions
    pub struct MemoryEventPublisher {
        published: Mutex<Vec<String>>,
    }

    impl MemoryEventPublisher {
        /// Create an empty publisher
        pub fn new() -> Self {
            Self {
                published: Mutex::new(Vec::new()),
            }
        }

        /// The event types published so far, in order
        pub fn event_types(&self) -> Vec<String> {
            self.published.lock().expect("publisher lock poisoned").clone()
        }
    }

    impl Default for MemoryEventPublisher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DomainEventPublisher for MemoryEventPublisher {
        async fn publish(&self, event: &dyn DomainEvent) -> Result<(), CoreError> {
            self.published
                .lock()
                .expect("publisher lock poisoned")
                .push(event.event_type().to_string());
            Ok(())
        }
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::memory::*;
    use super::*;
    use crate::domain::factory::FlowInstanceFactory;
    use crate::domain::flow_instance::{FlowMode, FlowType};
    use crate::domain::node_instance::NodeInstance;
    use crate::domain::flow_instance::NodeId;
    use crate::domain::process_variables::ProcessVariables;

    fn fresh_instance() -> FlowInstance {
        FlowInstanceFactory::create(
            DocumentId(100),
            FlowDefId(5),
            FlowType::Issuance,
            FlowMode::Fixed,
            ProcessVariables::default(),
        )
    }

    #[tokio::test]
    async fn test_save_assigns_ids() {
        let repo = MemoryFlowInstanceRepository::new();
        let mut instance = fresh_instance();
        instance
            .add_node_instance(NodeInstance::new(None, NodeId(1), None))
            .unwrap();

        let id = repo.save(&mut instance).await.unwrap();

        assert_eq!(instance.id(), Some(id));
        assert!(instance.node_instances()[0].id().is_some());
        assert_eq!(instance.node_instances()[0].flow_instance_id(), Some(id));

        let loaded = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.document_id(), DocumentId(100));
        // stored copy carries no pending events
        assert!(loaded.pending_events().is_empty());
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let repo = MemoryFlowInstanceRepository::new();
        let mut a = fresh_instance();
        let mut b = fresh_instance();

        let id_a = repo.save(&mut a).await.unwrap();
        let id_b = repo.save(&mut b).await.unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn test_list_by_document_and_delete() {
        let repo = MemoryFlowInstanceRepository::new();
        let mut instance = fresh_instance();
        let id = repo.save(&mut instance).await.unwrap();

        assert_eq!(repo.list_by_document(DocumentId(100)).await.unwrap().len(), 1);
        assert!(repo.list_by_document(DocumentId(999)).await.unwrap().is_empty());

        repo.delete(id).await.unwrap();
        assert!(repo.find_by_id(id).await.unwrap().is_none());
    }
}
