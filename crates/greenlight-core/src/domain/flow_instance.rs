use crate::{
    domain::events::{DomainEvent, FlowCompleted, FlowStarted, FlowTerminated, NodeInstanceCreated, NodeCompleted},
    domain::node_instance::{NodeInstance, NodeInstanceId},
    domain::process_variables::ProcessVariables,
    CoreError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value object: Flow instance ID (assigned by storage on first save)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowInstanceId(pub i64);

/// Value object: ID of the document under approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub i64);

/// Value object: ID of the flow definition (template) an instance runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowDefId(pub i64);

/// Value object: ID of a node in the flow definition graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub i64);

/// Flow type: the kind of document routing the process performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    /// Outbound document (issuance)
    Issuance,

    /// Inbound document (receipt)
    Receipt,
}

impl FlowType {
    /// Numeric code used at the persistence boundary
    pub fn code(&self) -> i32 {
        match self {
            FlowType::Issuance => 1,
            FlowType::Receipt => 2,
        }
    }

    /// Build from a persisted numeric code
    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        match code {
            1 => Ok(FlowType::Issuance),
            2 => Ok(FlowType::Receipt),
            other => Err(CoreError::ValidationError(format!(
                "invalid flow type value: {}",
                other
            ))),
        }
    }
}

/// Flow mode: how the route of the process is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowMode {
    /// Route is fully determined by the flow definition
    Fixed,

    /// Route is chosen step by step by the participants
    Free,

    /// Fixed backbone with free segments
    Hybrid,
}

impl FlowMode {
    /// Numeric code used at the persistence boundary
    pub fn code(&self) -> i32 {
        match self {
            FlowMode::Fixed => 1,
            FlowMode::Free => 2,
            FlowMode::Hybrid => 3,
        }
    }

    /// Build from a persisted numeric code
    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        match code {
            1 => Ok(FlowMode::Fixed),
            2 => Ok(FlowMode::Free),
            3 => Ok(FlowMode::Hybrid),
            other => Err(CoreError::ValidationError(format!(
                "invalid flow mode value: {}",
                other
            ))),
        }
    }
}

/// Lifecycle status of a flow instance.
///
/// The status is only ever changed through the transition table in
/// [`FlowStatus::transition`]; callers go through the aggregate's lifecycle
/// methods and never assign it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStatus {
    /// Flow is running and may proceed
    Processing,

    /// Flow finished successfully (terminal)
    Completed,

    /// Flow was terminated by an approver decision (terminal)
    Terminated,

    /// Flow is paused; only `resume` is permitted
    Suspended,

    /// Flow was cancelled or withdrawn (terminal)
    Cancelled,
}

impl FlowStatus {
    /// Numeric code used at the persistence boundary
    pub fn code(&self) -> i32 {
        match self {
            FlowStatus::Processing => 0,
            FlowStatus::Completed => 1,
            FlowStatus::Terminated => 2,
            FlowStatus::Suspended => 3,
            FlowStatus::Cancelled => 4,
        }
    }

    /// Build from a persisted numeric code
    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        match code {
            0 => Ok(FlowStatus::Processing),
            1 => Ok(FlowStatus::Completed),
            2 => Ok(FlowStatus::Terminated),
            3 => Ok(FlowStatus::Suspended),
            4 => Ok(FlowStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!(
                "invalid flow status value: {}",
                other
            ))),
        }
    }

    /// True only while the flow is running
    #[inline]
    pub fn is_processing(&self) -> bool {
        matches!(self, FlowStatus::Processing)
    }

    /// True once the flow finished successfully
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, FlowStatus::Completed)
    }

    /// True once the flow was terminated
    #[inline]
    pub fn is_terminated(&self) -> bool {
        matches!(self, FlowStatus::Terminated)
    }

    /// True while the flow is paused
    #[inline]
    pub fn is_suspended(&self) -> bool {
        matches!(self, FlowStatus::Suspended)
    }

    /// True once the flow was cancelled
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlowStatus::Cancelled)
    }

    /// Whether execution may proceed from this state.
    /// Only `Processing` is proceed-capable; `Suspended` blocks until resumed.
    #[inline]
    pub fn can_proceed(&self) -> bool {
        matches!(self, FlowStatus::Processing)
    }

    /// Whether this is a terminal state (endTime has been stamped)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowStatus::Completed | FlowStatus::Terminated | FlowStatus::Cancelled
        )
    }

    /// The lifecycle transition table.
    ///
    /// Pure function of (state, action). Every pair not listed here is an
    /// illegal transition and is rejected with the state and action attached,
    /// which keeps the machine exhaustive and auditable.
    pub fn transition(self, action: FlowAction) -> Result<FlowStatus, CoreError> {
        use FlowAction::*;
        use FlowStatus::*;

        match (self, action) {
            (Processing, Start) => Ok(Processing),
            (Processing, Complete) => Ok(Completed),
            (Processing, Terminate) => Ok(Terminated),
            (Processing, Suspend) => Ok(Suspended),
            (Processing, Cancel) => Ok(Cancelled),
            (Suspended, Resume) => Ok(Processing),
            (state, action) => Err(CoreError::IllegalTransition { state, action }),
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowStatus::Processing => "Processing",
            FlowStatus::Completed => "Completed",
            FlowStatus::Terminated => "Terminated",
            FlowStatus::Suspended => "Suspended",
            FlowStatus::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// The actions a caller can invoke on a flow instance's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    /// Refresh the start of a running flow
    Start,

    /// Finish the flow successfully
    Complete,

    /// Terminate the flow
    Terminate,

    /// Pause the flow
    Suspend,

    /// Resume a paused flow
    Resume,

    /// Cancel the flow
    Cancel,
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowAction::Start => "start",
            FlowAction::Complete => "complete",
            FlowAction::Terminate => "terminate",
            FlowAction::Suspend => "suspend",
            FlowAction::Resume => "resume",
            FlowAction::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// Aggregate root: one running or finished approval process attached to a
/// document.
///
/// The aggregate is the unit of consistency: exactly one logical writer may
/// mutate a given instance at a time (enforced by the persistence layer via
/// locking or the `version` stamp). All lifecycle changes go through the
/// transition table; a rejected action leaves every field untouched.
#[derive(Debug, Serialize, Deserialize)]
pub struct FlowInstance {
    id: Option<FlowInstanceId>,
    document_id: DocumentId,
    flow_def_id: FlowDefId,
    flow_type: FlowType,
    flow_mode: FlowMode,
    status: FlowStatus,
    current_node_id: Option<NodeId>,
    process_variables: ProcessVariables,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    node_instances: Vec<NodeInstance>,
    /// Persistence version stamp; read and bumped by repositories only
    version: u64,

    /// Pending domain events, drained by the caller after persistence
    #[serde(skip)]
    events: Vec<Box<dyn DomainEvent>>,
}

// Domain events are transient and never cloned with the aggregate.
impl Clone for FlowInstance {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            document_id: self.document_id,
            flow_def_id: self.flow_def_id,
            flow_type: self.flow_type,
            flow_mode: self.flow_mode,
            status: self.status,
            current_node_id: self.current_node_id,
            process_variables: self.process_variables.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            created_at: self.created_at,
            updated_at: self.updated_at,
            node_instances: self.node_instances.clone(),
            version: self.version,
            events: Vec::new(),
        }
    }
}

impl FlowInstance {
    /// Create a brand-new aggregate in `Processing`. Used by the factory;
    /// records the started event.
    pub(crate) fn new(
        document_id: DocumentId,
        flow_def_id: FlowDefId,
        flow_type: FlowType,
        flow_mode: FlowMode,
        process_variables: ProcessVariables,
    ) -> Self {
        let now = Utc::now();

        let mut instance = Self {
            id: None,
            document_id,
            flow_def_id,
            flow_type,
            flow_mode,
            status: FlowStatus::Processing,
            current_node_id: None,
            process_variables,
            start_time: now,
            end_time: None,
            created_at: now,
            updated_at: now,
            node_instances: Vec::new(),
            version: 0,
            events: Vec::with_capacity(4),
        };

        instance.record_event(Box::new(FlowStarted {
            flow_instance_id: None,
            document_id,
            flow_def_id,
            occurred_at: now,
        }));

        instance
    }

    /// Rehydrate an aggregate from persisted fields. Used by the factory;
    /// records no events and does not re-derive timestamps.
    pub(crate) fn rehydrated(
        id: FlowInstanceId,
        document_id: DocumentId,
        flow_def_id: FlowDefId,
        flow_type: FlowType,
        flow_mode: FlowMode,
        process_variables: ProcessVariables,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Some(id),
            document_id,
            flow_def_id,
            flow_type,
            flow_mode,
            status: FlowStatus::Processing,
            current_node_id: None,
            process_variables,
            start_time: now,
            end_time: None,
            created_at: now,
            updated_at: now,
            node_instances: Vec::new(),
            version: 0,
            events: Vec::new(),
        }
    }

    // ---- accessors -------------------------------------------------------

    /// Instance id, absent until the first save
    #[inline]
    pub fn id(&self) -> Option<FlowInstanceId> {
        self.id
    }

    /// The document under approval
    #[inline]
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// The flow definition this instance runs
    #[inline]
    pub fn flow_def_id(&self) -> FlowDefId {
        self.flow_def_id
    }

    /// Flow type, immutable after creation
    #[inline]
    pub fn flow_type(&self) -> FlowType {
        self.flow_type
    }

    /// Flow mode, immutable after creation
    #[inline]
    pub fn flow_mode(&self) -> FlowMode {
        self.flow_mode
    }

    /// Current lifecycle status
    #[inline]
    pub fn status(&self) -> FlowStatus {
        self.status
    }

    /// The execution pointer into the definition graph
    #[inline]
    pub fn current_node_id(&self) -> Option<NodeId> {
        self.current_node_id
    }

    /// The variables threaded through policies and predicates
    #[inline]
    pub fn process_variables(&self) -> &ProcessVariables {
        &self.process_variables
    }

    /// When the process began
    #[inline]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// When the process reached a terminal state, if it has
    #[inline]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
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

    /// Node instances in creation order; the audit trail of progression
    #[inline]
    pub fn node_instances(&self) -> &[NodeInstance] {
        &self.node_instances
    }

    /// Persistence version stamp
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether execution may proceed
    #[inline]
    pub fn can_proceed(&self) -> bool {
        self.status.can_proceed()
    }

    // ---- lifecycle operations -------------------------------------------

    /// Validate and apply a lifecycle action. Any table miss leaves the
    /// aggregate untouched.
    fn apply(&mut self, action: FlowAction) -> Result<(), CoreError> {
        self.status = self.status.transition(action)?;
        self.touch();
        Ok(())
    }

    /// Refresh the start of a running flow
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.apply(FlowAction::Start)?;
        self.start_time = Utc::now();
        Ok(())
    }

    /// Finish the flow successfully. Stamps `end_time` and emits the
    /// completed event.
    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.apply(FlowAction::Complete)?;

        let ended = Utc::now();
        self.end_time = Some(ended);

        self.record_event(Box::new(FlowCompleted {
            flow_instance_id: self.id,
            document_id: self.document_id,
            start_time: self.start_time,
            end_time: ended,
            occurred_at: ended,
        }));

        Ok(())
    }

    /// Terminate the flow. Stamps `end_time` and emits the terminated event.
    pub fn terminate(&mut self) -> Result<(), CoreError> {
        self.apply(FlowAction::Terminate)?;

        let ended = Utc::now();
        self.end_time = Some(ended);

        self.record_event(Box::new(FlowTerminated {
            flow_instance_id: self.id,
            document_id: self.document_id,
            status_code: FlowStatus::Terminated.code(),
            occurred_at: ended,
        }));

        Ok(())
    }

    /// Pause the flow
    pub fn suspend(&mut self) -> Result<(), CoreError> {
        self.apply(FlowAction::Suspend)
    }

    /// Resume a paused flow
    pub fn resume(&mut self) -> Result<(), CoreError> {
        self.apply(FlowAction::Resume)
    }

    /// Cancel the flow. Stamps `end_time`; cancellation emits no lifecycle
    /// event.
    pub fn cancel(&mut self) -> Result<(), CoreError> {
        self.apply(FlowAction::Cancel)?;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    // ---- execution progress ---------------------------------------------

    /// Move the execution pointer to a node. Only permitted while the flow
    /// can proceed.
    pub fn move_to_node(&mut self, node_id: NodeId) -> Result<(), CoreError> {
        if !self.status.can_proceed() {
            return Err(CoreError::ValidationError(format!(
                "cannot move to node {} while flow is {}",
                node_id.0, self.status
            )));
        }
        self.current_node_id = Some(node_id);
        self.touch();
        Ok(())
    }

    /// Replace a process variable, producing a new variables value object
    pub fn set_variable(&mut self, key: &str, value: serde_json::Value) {
        self.process_variables = self.process_variables.with(key, value);
        self.touch();
    }

    /// Read a process variable
    #[inline]
    pub fn variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.process_variables.get(key)
    }

    /// Append a node instance and emit the created event. Node instances
    /// must belong to this flow instance.
    pub fn add_node_instance(&mut self, node_instance: NodeInstance) -> Result<(), CoreError> {
        if let (Some(id), Some(owner)) = (self.id, node_instance.flow_instance_id()) {
            if id != owner {
                return Err(CoreError::ValidationError(format!(
                    "node instance belongs to flow instance {}, not {}",
                    owner.0, id.0
                )));
            }
        }

        let event = NodeInstanceCreated {
            node_instance_id: node_instance.id(),
            flow_instance_id: self.id,
            node_id: node_instance.node_id(),
            approver_id: node_instance.approver().map(|a| a.user_id()),
            occurred_at: Utc::now(),
        };

        self.node_instances.push(node_instance);
        self.record_event(Box::new(event));
        self.touch();
        Ok(())
    }

    /// Complete the open node instance for `node_id` and emit the completed
    /// event.
    pub fn complete_node(
        &mut self,
        node_id: NodeId,
        comments: Option<String>,
    ) -> Result<(), CoreError> {
        if !self.status.can_proceed() {
            return Err(CoreError::ValidationError(format!(
                "cannot complete node {} while flow is {}",
                node_id.0, self.status
            )));
        }

        let (node_instance_id, approver_id) = {
            let node = self
                .open_node_mut(node_id)
                .ok_or(CoreError::NodeNotFound(node_id.0))?;
            node.complete(comments)?;
            (node.id(), node.approver().map(|a| a.user_id()))
        };

        self.record_event(Box::new(NodeCompleted {
            node_instance_id,
            flow_instance_id: self.id,
            node_id,
            approver_id,
            occurred_at: Utc::now(),
        }));
        self.touch();
        Ok(())
    }

    /// Reject the open node instance for `node_id`
    pub fn reject_node(
        &mut self,
        node_id: NodeId,
        comments: Option<String>,
    ) -> Result<(), CoreError> {
        if !self.status.can_proceed() {
            return Err(CoreError::ValidationError(format!(
                "cannot reject node {} while flow is {}",
                node_id.0, self.status
            )));
        }

        let node = self
            .open_node_mut(node_id)
            .ok_or(CoreError::NodeNotFound(node_id.0))?;
        node.reject(comments)?;
        self.touch();
        Ok(())
    }

    /// Cancel every node instance that is still open. Returns how many were
    /// cancelled. Used by withdraw and rollback.
    pub fn cancel_open_nodes(&mut self, reason: &str) -> usize {
        let mut cancelled = 0;
        for node in &mut self.node_instances {
            if node.status().can_handle() && node.cancel(reason).is_ok() {
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            self.touch();
        }
        cancelled
    }

    /// Whether any approval step has completed
    pub fn has_completed_node(&self) -> bool {
        self.node_instances.iter().any(|n| n.is_completed())
    }

    fn open_node_mut(&mut self, node_id: NodeId) -> Option<&mut NodeInstance> {
        self.node_instances
            .iter_mut()
            .find(|n| n.node_id() == node_id && n.status().can_handle())
    }

    // ---- domain events ---------------------------------------------------

    /// Record a domain event. Only the aggregate's own methods append.
    pub(crate) fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Events accumulated during the current unit of work
    #[inline]
    pub fn pending_events(&self) -> &[Box<dyn DomainEvent>] {
        &self.events
    }

    /// Get and clear all pending domain events
    pub fn drain_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }

    #[inline]
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ---- persistence binding --------------------------------------------
    // These mutators exist for storage adapters rehydrating or stamping an
    // aggregate; business code never calls them.

    /// Bind a storage-assigned id to the aggregate and stamp ids onto any
    /// node instances that do not have one yet.
    pub fn bind_storage_ids(
        &mut self,
        id: FlowInstanceId,
        next_node_instance_id: &mut dyn FnMut() -> NodeInstanceId,
    ) {
        self.id = Some(id);
        for node in &mut self.node_instances {
            if node.flow_instance_id().is_none() {
                node.set_flow_instance_id(id);
            }
            if node.id().is_none() {
                node.set_id(next_node_instance_id());
            }
        }
    }

    /// Set the persistence version stamp
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Restore a persisted status during rehydration
    pub fn restore_status(&mut self, status: FlowStatus) {
        self.status = status;
    }

    /// Restore persisted timestamps during rehydration
    pub fn restore_times(
        &mut self,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) {
        self.start_time = start_time;
        self.end_time = end_time;
        self.created_at = created_at;
        self.updated_at = updated_at;
    }

    /// Restore the persisted execution pointer during rehydration
    pub fn restore_current_node(&mut self, node_id: Option<NodeId>) {
        self.current_node_id = node_id;
    }

    /// Restore persisted node instances during rehydration
    pub fn restore_node_instances(&mut self, node_instances: Vec<NodeInstance>) {
        self.node_instances = node_instances;
    }
}
