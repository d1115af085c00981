use crate::{
    application::assignment_service::ApproverAssignmentService,
    application::routing_service::NodeRoutingService,
    domain::approver::UserId,
    domain::factory::FlowInstanceFactory,
    domain::flow_definition::FlowDefinition,
    domain::flow_instance::{
        DocumentId, FlowDefId, FlowInstance, FlowInstanceId, FlowMode, FlowType, NodeId,
    },
    domain::node_instance::NodeInstance,
    domain::process_variables::ProcessVariables,
    domain::repository::{DomainEventPublisher, FlowDefinitionRepository, FlowInstanceRepository},
    domain::specification,
    CoreError,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrates the load → mutate → save → publish cycle around the flow
/// instance aggregate.
///
/// Every operation either fully applies (aggregate mutated, saved, events
/// drained to the publisher) or fails with the aggregate unsaved. Event
/// delivery happens after the save and is best-effort: a failing publisher
/// is logged and never fails the operation.
pub struct FlowLifecycleService {
    instances: Arc<dyn FlowInstanceRepository>,
    definitions: Arc<dyn FlowDefinitionRepository>,
    assignment: ApproverAssignmentService,
    routing: NodeRoutingService,
    publisher: Arc<dyn DomainEventPublisher>,
}

impl FlowLifecycleService {
    /// Create a new flow lifecycle service
    pub fn new(
        instances: Arc<dyn FlowInstanceRepository>,
        definitions: Arc<dyn FlowDefinitionRepository>,
        assignment: ApproverAssignmentService,
        routing: NodeRoutingService,
        publisher: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        Self {
            instances,
            definitions,
            assignment,
            routing,
            publisher,
        }
    }

    /// Start a new approval process: build the aggregate, activate the entry
    /// node, persist, publish.
    pub async fn create_flow(
        &self,
        document_id: DocumentId,
        flow_def_id: FlowDefId,
        flow_type: FlowType,
        flow_mode: FlowMode,
        variables: ProcessVariables,
    ) -> Result<FlowInstanceId, CoreError> {
        let definition = self.load_definition(flow_def_id).await?;
        definition.validate()?;

        let mut instance =
            FlowInstanceFactory::create(document_id, flow_def_id, flow_type, flow_mode, variables);
        self.advance(&mut instance, &definition).await?;

        let id = self.instances.save(&mut instance).await?;
        self.publish_events(&mut instance).await;

        info!(
            flow_instance_id = id.0,
            document_id = document_id.0,
            flow_def_id = flow_def_id.0,
            "flow instance created"
        );
        Ok(id)
    }

    /// Complete a flow
    pub async fn complete_flow(&self, id: FlowInstanceId) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;
        instance.complete()?;
        self.save_and_publish(&mut instance).await
    }

    /// Terminate a flow
    pub async fn terminate_flow(&self, id: FlowInstanceId) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;
        instance.terminate()?;
        self.save_and_publish(&mut instance).await
    }

    /// Suspend a flow
    pub async fn suspend_flow(&self, id: FlowInstanceId) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;
        instance.suspend()?;
        self.save_and_publish(&mut instance).await
    }

    /// Resume a suspended flow
    pub async fn resume_flow(&self, id: FlowInstanceId) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;
        instance.resume()?;
        self.save_and_publish(&mut instance).await
    }

    /// Cancel a flow
    pub async fn cancel_flow(&self, id: FlowInstanceId) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;
        instance.cancel()?;
        self.save_and_publish(&mut instance).await
    }

    /// Withdraw a flow on behalf of its initiator. Gated by the withdraw
    /// specification; a denial is a validation error carrying the reason.
    pub async fn withdraw_flow(
        &self,
        id: FlowInstanceId,
        user_id: UserId,
    ) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;

        if !specification::flow_can_be_withdrawn(&instance, user_id) {
            return Err(CoreError::ValidationError(format!(
                "flow instance {} cannot be withdrawn by user {}",
                id.0, user_id.0
            )));
        }

        instance.cancel()?;
        instance.cancel_open_nodes("flow withdrawn by initiator");
        info!(flow_instance_id = id.0, user_id = user_id.0, "flow withdrawn");
        self.save_and_publish(&mut instance).await
    }

    /// Roll the flow back to a previously completed node. Gated by the
    /// rollback specification; open steps are closed and the target node is
    /// re-activated with freshly assigned approvers.
    pub async fn rollback_flow(
        &self,
        id: FlowInstanceId,
        target_node_id: NodeId,
    ) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;

        if !specification::flow_can_rollback(&instance, target_node_id) {
            return Err(CoreError::ValidationError(format!(
                "flow instance {} cannot roll back to node {}",
                id.0, target_node_id.0
            )));
        }

        let definition = self.load_definition(instance.flow_def_id()).await?;
        let target = definition
            .node(target_node_id)
            .ok_or(CoreError::NodeNotFound(target_node_id.0))?;

        instance.cancel_open_nodes("superseded by rollback");
        instance.move_to_node(target_node_id)?;
        for node_instance in self.assignment.build_node_instances(target, &instance).await? {
            instance.add_node_instance(node_instance)?;
        }

        info!(
            flow_instance_id = id.0,
            target_node_id = target_node_id.0,
            "flow rolled back"
        );
        self.save_and_publish(&mut instance).await
    }

    /// Approve the open step of `node_id` and route execution onward:
    /// activate the next nodes, pass through gateways, and complete the flow
    /// when no node remains.
    pub async fn approve_node(
        &self,
        id: FlowInstanceId,
        node_id: NodeId,
        comments: Option<String>,
    ) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;
        instance.complete_node(node_id, comments)?;

        let definition = self.load_definition(instance.flow_def_id()).await?;
        self.advance(&mut instance, &definition).await?;

        self.save_and_publish(&mut instance).await
    }

    /// Reject the open step of `node_id`. Rejection terminates the flow.
    pub async fn reject_node(
        &self,
        id: FlowInstanceId,
        node_id: NodeId,
        comments: Option<String>,
    ) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;
        instance.reject_node(node_id, comments)?;
        instance.cancel_open_nodes("flow rejected");
        instance.terminate()?;

        info!(flow_instance_id = id.0, node_id = node_id.0, "flow rejected");
        self.save_and_publish(&mut instance).await
    }

    /// Set a process variable
    pub async fn set_process_variable(
        &self,
        id: FlowInstanceId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), CoreError> {
        let mut instance = self.load_instance(id).await?;
        instance.set_variable(key, value);
        self.instances.save(&mut instance).await?;
        Ok(())
    }

    /// Read a flow instance snapshot
    pub async fn get_flow(&self, id: FlowInstanceId) -> Result<FlowInstance, CoreError> {
        self.load_instance(id).await
    }

    // ---- internals -------------------------------------------------------

    /// Route execution forward from the current position. Activates task
    /// nodes via assignment, expands splits, waits at unconverged joins, and
    /// completes the flow when nothing remains to execute.
    async fn advance(
        &self,
        instance: &mut FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<(), CoreError> {
        if !self.routing.can_advance(instance, definition)? {
            debug!(
                current_node = ?instance.current_node_id().map(|n| n.0),
                "current position not finished, waiting"
            );
            return Ok(());
        }

        let mut worklist: VecDeque<NodeId> =
            self.routing.next_from_current(instance, definition)?.into();
        if worklist.is_empty() {
            instance.complete()?;
            return Ok(());
        }

        // visit limit bounds malformed cyclic definitions
        let visit_limit = definition.nodes.len() * 4 + 8;
        let mut visited = 0usize;
        let mut activated = false;

        while let Some(node_id) = worklist.pop_front() {
            visited += 1;
            if visited > visit_limit {
                return Err(CoreError::ValidationError(format!(
                    "routing did not terminate in flow definition {}",
                    definition.id.0
                )));
            }

            let node = definition
                .node(node_id)
                .ok_or(CoreError::NodeNotFound(node_id.0))?;

            if node.gateway_type.is_join() {
                if self.routing.can_enter(node, instance, definition)? {
                    instance.move_to_node(node.node_id)?;
                    worklist.extend(node.next_node_ids.iter().copied());
                } else {
                    debug!(join = node.node_id.0, "join not yet convergeable, waiting");
                }
            } else if node.gateway_type.is_split() {
                instance.move_to_node(node.node_id)?;
                let branches = self.routing.next_from_current(instance, definition)?;
                worklist.extend(branches);
            } else if self.routing.should_skip(node, instance)? {
                instance.add_node_instance(NodeInstance::new_skipped(
                    instance.id(),
                    node.node_id,
                    "skip condition satisfied",
                ))?;
                instance.move_to_node(node.node_id)?;
                worklist.extend(node.next_node_ids.iter().copied());
            } else {
                for node_instance in self.assignment.build_node_instances(node, instance).await? {
                    instance.add_node_instance(node_instance)?;
                }
                instance.move_to_node(node.node_id)?;
                activated = true;
            }
        }

        // nothing activated and nothing open: the process has run off the
        // end of its definition
        if !activated
            && instance.status().is_processing()
            && !instance
                .node_instances()
                .iter()
                .any(|n| n.status().can_handle())
        {
            instance.complete()?;
        }

        Ok(())
    }

    async fn load_instance(&self, id: FlowInstanceId) -> Result<FlowInstance, CoreError> {
        self.instances
            .find_by_id(id)
            .await?
            .ok_or(CoreError::FlowInstanceNotFound(id.0))
    }

    async fn load_definition(&self, id: FlowDefId) -> Result<FlowDefinition, CoreError> {
        self.definitions
            .find_by_id(id)
            .await?
            .ok_or(CoreError::FlowDefinitionNotFound(id.0))
    }

    async fn save_and_publish(&self, instance: &mut FlowInstance) -> Result<(), CoreError> {
        self.instances.save(instance).await?;
        self.publish_events(instance).await;
        Ok(())
    }

    /// Drain the aggregate's events into the publisher. Delivery failures
    /// are logged and swallowed; the committed transition stands.
    async fn publish_events(&self, instance: &mut FlowInstance) {
        for event in instance.drain_events() {
            match self.publisher.publish(event.as_ref()).await {
                Ok(()) => debug!(event_type = event.event_type(), "published domain event"),
                Err(e) => warn!(
                    event_type = event.event_type(),
                    error = %e,
                    "domain event delivery failed"
                ),
            }
        }
    }
}
