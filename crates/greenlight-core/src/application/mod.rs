/// Approver assignment service
pub mod assignment_service;

/// Flow lifecycle orchestration service
pub mod flow_lifecycle_service;

/// Node routing service
pub mod routing_service;

pub use assignment_service::ApproverAssignmentService;
pub use flow_lifecycle_service::FlowLifecycleService;
pub use routing_service::NodeRoutingService;
