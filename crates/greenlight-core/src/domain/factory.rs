use crate::domain::flow_instance::{
    DocumentId, FlowDefId, FlowInstance, FlowInstanceId, FlowMode, FlowType,
};
use crate::domain::process_variables::ProcessVariables;

/// Factory for flow instance aggregates.
///
/// The two construction paths are intentionally distinct: `create` is "a new
/// process begins" and records the started event; `reconstruct` rehydrates
/// previously persisted fields without re-deriving timestamps or re-emitting
/// lifecycle events.
pub struct FlowInstanceFactory;

impl FlowInstanceFactory {
    /// Build a brand-new aggregate in `Processing` with `start_time` set to
    /// now. The instance has no id until storage assigns one.
    pub fn create(
        document_id: DocumentId,
        flow_def_id: FlowDefId,
        flow_type: FlowType,
        flow_mode: FlowMode,
        variables: ProcessVariables,
    ) -> FlowInstance {
        FlowInstance::new(document_id, flow_def_id, flow_type, flow_mode, variables)
    }

    /// Rehydrate an aggregate from persisted fields. Idempotent: two calls
    /// with identical inputs yield behaviorally identical aggregates, with
    /// zero pending events. Persisted status, timestamps, pointer and node
    /// instances are restored by the storage adapter afterwards via the
    /// `restore_*` methods.
    pub fn reconstruct(
        id: FlowInstanceId,
        document_id: DocumentId,
        flow_def_id: FlowDefId,
        flow_type: FlowType,
        flow_mode: FlowMode,
        variables: ProcessVariables,
    ) -> FlowInstance {
        FlowInstance::rehydrated(id, document_id, flow_def_id, flow_type, flow_mode, variables)
    }
}
