use crate::domain::approver::UserId;
use crate::domain::flow_instance::{DocumentId, FlowDefId, FlowInstanceId, NodeId};
use crate::domain::node_instance::NodeInstanceId;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Domain event trait for all events emitted by the aggregate.
///
/// Events are immutable facts describing a completed state change. They are
/// accumulated on the aggregate during a unit of work and handed to a
/// publisher by the caller after persistence succeeds.
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the flow instance this event is associated with, if the
    /// instance has been persisted yet
    fn flow_instance_id(&self) -> Option<FlowInstanceId>;

    /// Returns the timestamp when the event occurred
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Downcast support for subscribers interested in a concrete event
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Event: an approval process began
#[derive(Debug)]
pub struct FlowStarted {
    /// The flow instance, absent when the instance is not yet persisted
    pub flow_instance_id: Option<FlowInstanceId>,

    /// The document under approval
    pub document_id: DocumentId,

    /// The flow definition used
    pub flow_def_id: FlowDefId,

    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for FlowStarted {
    fn event_type(&self) -> &'static str {
        "flow_instance.started"
    }

    fn flow_instance_id(&self) -> Option<FlowInstanceId> {
        self.flow_instance_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Event: an approval process finished successfully
#[derive(Debug)]
pub struct FlowCompleted {
    /// The flow instance
    pub flow_instance_id: Option<FlowInstanceId>,

    /// The document under approval
    pub document_id: DocumentId,

    /// When the process began
    pub start_time: DateTime<Utc>,

    /// When the process finished
    pub end_time: DateTime<Utc>,

    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for FlowCompleted {
    fn event_type(&self) -> &'static str {
        "flow_instance.completed"
    }

    fn flow_instance_id(&self) -> Option<FlowInstanceId> {
        self.flow_instance_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Event: an approval process was terminated
#[derive(Debug)]
pub struct FlowTerminated {
    /// The flow instance
    pub flow_instance_id: Option<FlowInstanceId>,

    /// The document under approval
    pub document_id: DocumentId,

    /// Numeric code of the terminated status
    pub status_code: i32,

    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for FlowTerminated {
    fn event_type(&self) -> &'static str {
        "flow_instance.terminated"
    }

    fn flow_instance_id(&self) -> Option<FlowInstanceId> {
        self.flow_instance_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Event: a node instance was created and an approver assigned.
/// Downstream subscribers turn this into todo tasks and notifications.
#[derive(Debug)]
pub struct NodeInstanceCreated {
    /// The node instance, absent until storage assigns an id
    pub node_instance_id: Option<NodeInstanceId>,

    /// The owning flow instance
    pub flow_instance_id: Option<FlowInstanceId>,

    /// The definition node the step executes
    pub node_id: NodeId,

    /// The assigned approver, if the node was not skipped
    pub approver_id: Option<UserId>,

    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for NodeInstanceCreated {
    fn event_type(&self) -> &'static str {
        "node_instance.created"
    }

    fn flow_instance_id(&self) -> Option<FlowInstanceId> {
        self.flow_instance_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Event: an approval step was completed
#[derive(Debug)]
pub struct NodeCompleted {
    /// The node instance
    pub node_instance_id: Option<NodeInstanceId>,

    /// The owning flow instance
    pub flow_instance_id: Option<FlowInstanceId>,

    /// The definition node the step executed
    pub node_id: NodeId,

    /// The approver who acted
    pub approver_id: Option<UserId>,

    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent for NodeCompleted {
    fn event_type(&self) -> &'static str {
        "node_instance.completed"
    }

    fn flow_instance_id(&self) -> Option<FlowInstanceId> {
        self.flow_instance_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
