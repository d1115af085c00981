/// Approver value objects
pub mod approver;

/// Domain events
pub mod events;

/// Flow instance factory
pub mod factory;

/// Flow definition domain models
pub mod flow_definition;

/// Flow instance aggregate and lifecycle state machine
pub mod flow_instance;

/// Node instance entity
pub mod node_instance;

/// Process variables value object
pub mod process_variables;

/// Repository and collaborator interfaces
pub mod repository;

/// Business-rule predicates
pub mod specification;
