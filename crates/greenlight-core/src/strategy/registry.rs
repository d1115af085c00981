use crate::{
    domain::flow_definition::{ApproverType, GatewayType},
    strategy::assignment::ApproverAssignmentStrategy,
    strategy::routing::GatewayRoutingStrategy,
    CoreError,
};
use std::sync::Arc;
use tracing::debug;

/// Registry of approver assignment strategies.
///
/// Strategies are kept sorted by priority at registration time (stable sort,
/// so ties keep registration order and resolution stays deterministic).
/// Resolution picks the first supporting strategy; a type with no supporting
/// strategy is a configuration error, never a silent no-assignment.
pub struct AssignmentStrategyRegistry {
    strategies: Vec<Arc<dyn ApproverAssignmentStrategy>>,
}

impl AssignmentStrategyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Register a strategy, keeping the priority order
    pub fn register(&mut self, strategy: Arc<dyn ApproverAssignmentStrategy>) {
        self.strategies.push(strategy);
        self.strategies.sort_by_key(|s| s.priority());
    }

    /// Resolve the single applicable strategy for an approver type
    pub fn resolve(
        &self,
        approver_type: ApproverType,
    ) -> Result<Arc<dyn ApproverAssignmentStrategy>, CoreError> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.supports(approver_type))
            .cloned()
            .ok_or_else(|| {
                CoreError::ConfigurationError(format!(
                    "no assignment strategy supports approver type {:?}",
                    approver_type
                ))
            })?;

        debug!(strategy = strategy.name(), ?approver_type, "resolved assignment strategy");
        Ok(strategy)
    }

    /// Number of registered strategies
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for AssignmentStrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of gateway routing strategies; same single-match discipline as
/// assignment strategies (here selection is purely by supported type, in
/// registration order).
pub struct RoutingStrategyRegistry {
    strategies: Vec<Arc<dyn GatewayRoutingStrategy>>,
}

impl RoutingStrategyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Register a strategy
    pub fn register(&mut self, strategy: Arc<dyn GatewayRoutingStrategy>) {
        self.strategies.push(strategy);
    }

    /// Resolve the single applicable strategy for a gateway type
    pub fn resolve(
        &self,
        gateway_type: GatewayType,
    ) -> Result<Arc<dyn GatewayRoutingStrategy>, CoreError> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.supports(gateway_type))
            .cloned()
            .ok_or_else(|| {
                CoreError::ConfigurationError(format!(
                    "no routing strategy supports gateway type {:?}",
                    gateway_type
                ))
            })?;

        debug!(strategy = strategy.name(), ?gateway_type, "resolved routing strategy");
        Ok(strategy)
    }

    /// Number of registered strategies
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for RoutingStrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::approver::Approver;
    use crate::domain::flow_instance::FlowInstanceId;
    use crate::domain::process_variables::ProcessVariables;
    use async_trait::async_trait;

    struct FixedPriorityStrategy {
        priority: i32,
        label: &'static str,
    }

    #[async_trait]
    impl ApproverAssignmentStrategy for FixedPriorityStrategy {
        async fn assign(
            &self,
            _approver_value: &str,
            _flow_instance_id: Option<FlowInstanceId>,
            _variables: &ProcessVariables,
        ) -> Result<Vec<Approver>, CoreError> {
            Ok(Vec::new())
        }

        fn supports(&self, approver_type: ApproverType) -> bool {
            approver_type == ApproverType::User
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    #[test]
    fn test_lowest_priority_wins() {
        let mut registry = AssignmentStrategyRegistry::new();
        registry.register(Arc::new(FixedPriorityStrategy {
            priority: 20,
            label: "second",
        }));
        registry.register(Arc::new(FixedPriorityStrategy {
            priority: 10,
            label: "first",
        }));

        let resolved = registry.resolve(ApproverType::User).unwrap();
        assert_eq!(resolved.name(), "first");
    }

    #[test]
    fn test_priority_ties_keep_registration_order() {
        let mut registry = AssignmentStrategyRegistry::new();
        registry.register(Arc::new(FixedPriorityStrategy {
            priority: 10,
            label: "registered-first",
        }));
        registry.register(Arc::new(FixedPriorityStrategy {
            priority: 10,
            label: "registered-second",
        }));

        // resolution is deterministic across repeated calls
        for _ in 0..3 {
            let resolved = registry.resolve(ApproverType::User).unwrap();
            assert_eq!(resolved.name(), "registered-first");
        }
    }

    #[test]
    fn test_unsupported_type_is_configuration_error() {
        let mut registry = AssignmentStrategyRegistry::new();
        registry.register(Arc::new(FixedPriorityStrategy {
            priority: 10,
            label: "users-only",
        }));

        let err = registry.resolve(ApproverType::Role).err().unwrap();
        assert!(matches!(err, CoreError::ConfigurationError(_)));

        let empty = RoutingStrategyRegistry::new();
        assert!(matches!(
            empty.resolve(GatewayType::ParallelSplit).err().unwrap(),
            CoreError::ConfigurationError(_)
        ));
    }
}
