//!
//! Greenlight Core - the document-approval workflow engine
//!
//! This crate defines the flow instance aggregate and its lifecycle state
//! machine, the pluggable approver-assignment and gateway-routing policies,
//! the business-rule predicates gating withdraw and rollback, and the
//! repository interfaces the engine consumes at its boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Application services - orchestration around the aggregate
pub mod application;

/// Domain layer - aggregate, entities, value objects, events, rules
pub mod domain;

/// Error types
pub mod error;

/// Pluggable assignment and routing policies
pub mod strategy;

// Re-export key types
pub use error::CoreError;

pub use domain::approver::{Approver, DeptId, RoleId, UserId};
pub use domain::events::DomainEvent;
pub use domain::factory::FlowInstanceFactory;
pub use domain::flow_definition::{
    ApproverType, FlowDefinition, FlowNode, GatewayMode, GatewayType,
};
pub use domain::flow_instance::{
    DocumentId, FlowAction, FlowDefId, FlowInstance, FlowInstanceId, FlowMode, FlowStatus,
    FlowType, NodeId,
};
pub use domain::node_instance::{NodeInstance, NodeInstanceId, NodeStatus};
pub use domain::process_variables::ProcessVariables;
pub use domain::repository::{
    ApproverProvider, DomainEventPublisher, FlowDefinitionRepository, FlowInstanceRepository,
};

pub use application::{ApproverAssignmentService, FlowLifecycleService, NodeRoutingService};
