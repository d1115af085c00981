use crate::{
    domain::approver::Approver,
    domain::flow_definition::FlowNode,
    domain::flow_instance::FlowInstance,
    domain::node_instance::NodeInstance,
    domain::repository::ApproverProvider,
    strategy::assignment::{
        DeptLeaderApproverStrategy, InitiatorApproverStrategy, RoleApproverStrategy,
        UserApproverStrategy,
    },
    strategy::registry::AssignmentStrategyRegistry,
    CoreError,
};
use std::sync::Arc;
use tracing::info;

/// Resolves a node's approver configuration through the strategy registry
/// and builds the node instances for the resolved approvers.
pub struct ApproverAssignmentService {
    registry: AssignmentStrategyRegistry,
}

impl ApproverAssignmentService {
    /// Create the service over a prepared registry
    pub fn new(registry: AssignmentStrategyRegistry) -> Self {
        Self { registry }
    }

    /// Create the service with the standard strategy set (user, role,
    /// department leader, initiator-chosen) over one approver provider.
    pub fn with_default_strategies(provider: Arc<dyn ApproverProvider>) -> Self {
        let mut registry = AssignmentStrategyRegistry::new();
        registry.register(Arc::new(UserApproverStrategy::new(provider.clone())));
        registry.register(Arc::new(RoleApproverStrategy::new(provider.clone())));
        registry.register(Arc::new(DeptLeaderApproverStrategy::new(provider.clone())));
        registry.register(Arc::new(InitiatorApproverStrategy::new(provider)));
        Self::new(registry)
    }

    /// Resolve the approvers for a task node
    pub async fn assign_approvers(
        &self,
        node: &FlowNode,
        instance: &FlowInstance,
    ) -> Result<Vec<Approver>, CoreError> {
        let Some(approver_type) = node.approver_type else {
            return Err(CoreError::ValidationError(format!(
                "node {} has no approver configuration",
                node.node_id.0
            )));
        };
        let approver_value = node.approver_value.as_deref().unwrap_or("");

        let strategy = self.registry.resolve(approver_type)?;
        let approvers = strategy
            .assign(approver_value, instance.id(), instance.process_variables())
            .await?;

        info!(
            node_id = node.node_id.0,
            ?approver_type,
            strategy = strategy.name(),
            assigned = approvers.len(),
            "assigned approvers"
        );
        Ok(approvers)
    }

    /// Build pending node instances, one per resolved approver
    pub async fn build_node_instances(
        &self,
        node: &FlowNode,
        instance: &FlowInstance,
    ) -> Result<Vec<NodeInstance>, CoreError> {
        let approvers = self.assign_approvers(node, instance).await?;
        Ok(approvers
            .into_iter()
            .map(|approver| NodeInstance::new(instance.id(), node.node_id, Some(approver)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::approver::{DeptId, RoleId, UserId};
    use crate::domain::factory::FlowInstanceFactory;
    use crate::domain::flow_definition::ApproverType;
    use crate::domain::flow_instance::{DocumentId, FlowDefId, FlowMode, FlowType, NodeId};
    use crate::domain::process_variables::ProcessVariables;
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl ApproverProvider for EchoProvider {
        async fn approvers_by_user_ids(
            &self,
            user_ids: &[UserId],
        ) -> Result<Vec<Approver>, CoreError> {
            user_ids.iter().map(|id| Approver::new(*id)).collect()
        }

        async fn dept_leaders_by_dept_ids(
            &self,
            dept_ids: &[DeptId],
        ) -> Result<Vec<Approver>, CoreError> {
            dept_ids
                .iter()
                .map(|dept| Approver::with_dept(UserId(dept.0 + 1000), *dept))
                .collect()
        }

        async fn users_by_role_ids(
            &self,
            role_ids: &[RoleId],
        ) -> Result<Vec<Approver>, CoreError> {
            role_ids
                .iter()
                .map(|role| Approver::new(UserId(role.0 + 2000)))
                .collect()
        }
    }

    fn instance() -> FlowInstance {
        FlowInstanceFactory::create(
            DocumentId(100),
            FlowDefId(5),
            FlowType::Issuance,
            FlowMode::Fixed,
            ProcessVariables::default(),
        )
    }

    fn service() -> ApproverAssignmentService {
        ApproverAssignmentService::with_default_strategies(Arc::new(EchoProvider))
    }

    #[tokio::test]
    async fn test_builds_one_instance_per_approver() {
        let node = FlowNode::task(NodeId(1), FlowDefId(5), "review", 1)
            .with_approver(ApproverType::User, "3,7");

        let nodes = service().build_node_instances(&node, &instance()).await.unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].node_id(), NodeId(1));
        assert_eq!(nodes[0].approver().unwrap().user_id(), UserId(3));
        assert_eq!(nodes[1].approver().unwrap().user_id(), UserId(7));
    }

    #[tokio::test]
    async fn test_unconfigured_node_is_rejected() {
        let node = FlowNode::task(NodeId(1), FlowDefId(5), "review", 1);

        let err = service().assign_approvers(&node, &instance()).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_missing_strategy_is_configuration_error() {
        let service = ApproverAssignmentService::new(AssignmentStrategyRegistry::new());
        let node = FlowNode::task(NodeId(1), FlowDefId(5), "review", 1)
            .with_approver(ApproverType::User, "3");

        let err = service.assign_approvers(&node, &instance()).await.unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
    }
}
