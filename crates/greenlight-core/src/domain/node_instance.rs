use crate::{
    domain::approver::Approver,
    domain::flow_instance::{FlowInstanceId, NodeId},
    CoreError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value object: Node instance ID (assigned by storage on first save)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInstanceId(pub i64);

/// Status of a node instance. Statuses only advance forward; a terminal
/// node status rejects further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Waiting for the approver to pick the task up
    Pending,

    /// The approver is working on the task
    InProgress,

    /// Approved (terminal)
    Completed,

    /// Rejected by the approver (terminal)
    Rejected,

    /// Skipped by a routing rule (terminal)
    Skipped,

    /// Closed without a decision, e.g. by withdraw or rollback (terminal)
    Cancelled,
}

impl NodeStatus {
    /// Numeric code used at the persistence boundary
    pub fn code(&self) -> i32 {
        match self {
            NodeStatus::Pending => 0,
            NodeStatus::InProgress => 1,
            NodeStatus::Completed => 2,
            NodeStatus::Rejected => 3,
            NodeStatus::Skipped => 4,
            NodeStatus::Cancelled => 5,
        }
    }

    /// Build from a persisted numeric code
    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        match code {
            0 => Ok(NodeStatus::Pending),
            1 => Ok(NodeStatus::InProgress),
            2 => Ok(NodeStatus::Completed),
            3 => Ok(NodeStatus::Rejected),
            4 => Ok(NodeStatus::Skipped),
            5 => Ok(NodeStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!(
                "invalid node status value: {}",
                other
            ))),
        }
    }

    /// True only for the `Completed` terminal value
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, NodeStatus::Completed)
    }

    /// True for `Rejected`
    #[inline]
    pub fn is_rejected(&self) -> bool {
        matches!(self, NodeStatus::Rejected)
    }

    /// True for `Skipped`
    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self, NodeStatus::Skipped)
    }

    /// True for `Cancelled`
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NodeStatus::Cancelled)
    }

    /// Whether the step counts as passed for routing purposes
    /// (approved or routed around)
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Skipped)
    }

    /// Whether the approver can still act on the task
    #[inline]
    pub fn can_handle(&self) -> bool {
        matches!(self, NodeStatus::Pending | NodeStatus::InProgress)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Pending => "Pending",
            NodeStatus::InProgress => "InProgress",
            NodeStatus::Completed => "Completed",
            NodeStatus::Rejected => "Rejected",
            NodeStatus::Skipped => "Skipped",
            NodeStatus::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Entity: the execution record of one step within a flow instance.
///
/// Owned by a [`crate::domain::flow_instance::FlowInstance`]; created by
/// assignment, advanced by approver actions, closed by routing or rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInstance {
    id: Option<NodeInstanceId>,
    flow_instance_id: Option<FlowInstanceId>,
    node_id: NodeId,
    approver: Option<Approver>,
    status: NodeStatus,
    comments: Option<String>,
    handled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NodeInstance {
    /// Create a pending node instance for a definition node
    pub fn new(
        flow_instance_id: Option<FlowInstanceId>,
        node_id: NodeId,
        approver: Option<Approver>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            flow_instance_id,
            node_id,
            approver,
            status: NodeStatus::Pending,
            comments: None,
            handled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a node instance that is skipped from the outset, recording the
    /// skip reason. No approver is assigned.
    pub fn new_skipped(
        flow_instance_id: Option<FlowInstanceId>,
        node_id: NodeId,
        reason: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            flow_instance_id,
            node_id,
            approver: None,
            status: NodeStatus::Skipped,
            comments: Some(reason.to_string()),
            handled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    // ---- accessors -------------------------------------------------------

    /// Node instance id, absent until the first save
    #[inline]
    pub fn id(&self) -> Option<NodeInstanceId> {
        self.id
    }

    /// The owning flow instance, absent until the aggregate is saved
    #[inline]
    pub fn flow_instance_id(&self) -> Option<FlowInstanceId> {
        self.flow_instance_id
    }

    /// The definition node this step executes
    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The assigned approver, if any
    #[inline]
    pub fn approver(&self) -> Option<&Approver> {
        self.approver.as_ref()
    }

    /// Current step status
    #[inline]
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Free-text comments (decision remarks, skip reason)
    #[inline]
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// When the approver acted, if they have
    #[inline]
    pub fn handled_at(&self) -> Option<DateTime<Utc>> {
        self.handled_at
    }

    /// Creation timestamp
    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last-modified timestamp
    #[inline]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True only when the step was approved
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// True when the step counts as passed for routing
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    // ---- forward-only transitions ---------------------------------------

    fn guard(&self, action: &str) -> Result<(), CoreError> {
        if !self.status.can_handle() {
            return Err(CoreError::ValidationError(format!(
                "node instance cannot be {}, current status: {}",
                action, self.status
            )));
        }
        Ok(())
    }

    /// Mark the task as picked up by the approver
    pub fn start_processing(&mut self) -> Result<(), CoreError> {
        self.guard("started")?;
        self.status = NodeStatus::InProgress;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Approve the step
    pub fn complete(&mut self, comments: Option<String>) -> Result<(), CoreError> {
        self.guard("completed")?;
        self.status = NodeStatus::Completed;
        self.comments = comments;
        let now = Utc::now();
        self.handled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Reject the step
    pub fn reject(&mut self, comments: Option<String>) -> Result<(), CoreError> {
        self.guard("rejected")?;
        self.status = NodeStatus::Rejected;
        self.comments = comments;
        let now = Utc::now();
        self.handled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Skip the step, recording the reason
    pub fn skip(&mut self, reason: &str) -> Result<(), CoreError> {
        self.guard("skipped")?;
        self.status = NodeStatus::Skipped;
        self.comments = Some(reason.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Close the step without a decision, recording the reason
    pub fn cancel(&mut self, reason: &str) -> Result<(), CoreError> {
        self.guard("cancelled")?;
        self.status = NodeStatus::Cancelled;
        self.comments = Some(reason.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    // ---- persistence binding --------------------------------------------

    /// Set the storage-assigned id
    pub fn set_id(&mut self, id: NodeInstanceId) {
        self.id = Some(id);
    }

    /// Set the owning flow instance id once storage has assigned one
    pub fn set_flow_instance_id(&mut self, id: FlowInstanceId) {
        self.flow_instance_id = Some(id);
    }

    /// Restore a persisted status during rehydration
    pub fn restore_status(&mut self, status: NodeStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::approver::{Approver, UserId};

    #[test]
    fn test_new_instance_is_pending() {
        let approver = Approver::new(UserId(7)).unwrap();
        let node = NodeInstance::new(Some(FlowInstanceId(1)), NodeId(10), Some(approver));

        assert_eq!(node.status(), NodeStatus::Pending);
        assert!(node.id().is_none());
        assert!(!node.is_completed());
        assert!(!node.is_finished());
        assert!(node.status().can_handle());
    }

    #[test]
    fn test_complete_is_terminal() {
        let mut node = NodeInstance::new(None, NodeId(10), None);
        node.start_processing().unwrap();
        node.complete(Some("looks good".to_string())).unwrap();

        assert!(node.is_completed());
        assert!(node.is_finished());
        assert_eq!(node.comments(), Some("looks good"));
        assert!(node.handled_at().is_some());

        // no un-completing
        assert!(node.complete(None).is_err());
        assert!(node.reject(None).is_err());
        assert!(node.skip("late skip").is_err());
        assert!(node.cancel("late cancel").is_err());
        assert_eq!(node.status(), NodeStatus::Completed);
    }

    #[test]
    fn test_reject_records_comments() {
        let mut node = NodeInstance::new(None, NodeId(10), None);
        node.reject(Some("missing attachment".to_string())).unwrap();

        assert!(node.status().is_rejected());
        assert!(!node.is_finished());
        assert_eq!(node.comments(), Some("missing attachment"));
    }

    #[test]
    fn test_skipped_counts_as_finished_not_completed() {
        let node = NodeInstance::new_skipped(None, NodeId(10), "amount below threshold");

        assert_eq!(node.status(), NodeStatus::Skipped);
        assert!(node.is_finished());
        assert!(!node.is_completed());
        assert_eq!(node.comments(), Some("amount below threshold"));
    }

    #[test]
    fn test_cancel_from_in_progress() {
        let mut node = NodeInstance::new(None, NodeId(10), None);
        node.start_processing().unwrap();
        node.cancel("flow withdrawn").unwrap();

        assert!(node.status().is_cancelled());
        assert!(!node.is_finished());
    }

    #[test]
    fn test_status_codes_roundtrip() {
        for status in [
            NodeStatus::Pending,
            NodeStatus::InProgress,
            NodeStatus::Completed,
            NodeStatus::Rejected,
            NodeStatus::Skipped,
            NodeStatus::Cancelled,
        ] {
            assert_eq!(NodeStatus::from_code(status.code()).unwrap(), status);
        }
        assert!(NodeStatus::from_code(42).is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let approver = Approver::new(UserId(7)).unwrap();
        let node = NodeInstance::new(Some(FlowInstanceId(3)), NodeId(10), Some(approver));

        let serialized = serde_json::to_string(&node).unwrap();
        let deserialized: NodeInstance = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.node_id(), node.node_id());
        assert_eq!(deserialized.status(), node.status());
        assert_eq!(deserialized.flow_instance_id(), node.flow_instance_id());
    }
}
