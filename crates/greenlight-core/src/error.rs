use thiserror::Error;

use crate::domain::flow_instance::{FlowAction, FlowStatus};

/// Core error type for the Greenlight workflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Action not permitted by the lifecycle state machine.
    ///
    /// Carries the state the aggregate was in and the rejected action so the
    /// caller can produce a precise diagnostic. The aggregate is guaranteed
    /// to be unmodified when this is returned.
    #[error("current state {state} does not permit `{action}`")]
    IllegalTransition {
        /// State the aggregate was in when the action was attempted
        state: FlowStatus,
        /// The rejected action
        action: FlowAction,
    },

    /// No registered strategy supports the requested approver/gateway type.
    /// Indicates a deployment defect, not a transient condition.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A strategy exists but could not resolve a valid target
    /// (e.g. an empty department, an unparsable approver list).
    #[error("Resolution failure: {0}")]
    ResolutionFailure(String),

    /// Optimistic version check failed on save; reload and retry.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Flow instance not found
    #[error("Flow instance not found: {0}")]
    FlowInstanceNotFound(i64),

    /// Flow definition not found
    #[error("Flow definition not found: {0}")]
    FlowDefinitionNotFound(i64),

    /// Flow node not found in the definition graph
    #[error("Flow node not found: {0}")]
    NodeNotFound(i64),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Event delivery error. Callers at the publisher boundary catch and log
    /// this; it never rolls back a committed transition.
    #[error("Event delivery error: {0}")]
    EventDeliveryError(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
