use crate::{
    domain::flow_definition::{FlowDefinition, FlowNode},
    domain::flow_instance::{FlowInstance, NodeId},
    strategy::registry::RoutingStrategyRegistry,
    strategy::routing::{
        ConditionEvaluator, ConditionGatewayStrategy, ParallelGatewayStrategy,
        SimpleConditionEvaluator,
    },
    CoreError,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Computes where execution goes next: the outgoing nodes of the current
/// position, join gating, and skip decisions. Gateway handling is delegated
/// to the routing strategies through the registry.
pub struct NodeRoutingService {
    registry: RoutingStrategyRegistry,
    evaluator: Arc<dyn ConditionEvaluator>,
}

impl NodeRoutingService {
    /// Create the service over a prepared registry and condition evaluator
    pub fn new(registry: RoutingStrategyRegistry, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self { registry, evaluator }
    }

    /// Create the service with the standard strategy set (parallel and
    /// condition gateways) and the default condition evaluator.
    pub fn with_default_strategies() -> Self {
        let mut registry = RoutingStrategyRegistry::new();
        registry.register(Arc::new(ParallelGatewayStrategy));
        registry.register(Arc::new(ConditionGatewayStrategy::default()));
        Self::new(registry, Arc::new(SimpleConditionEvaluator))
    }

    /// The nodes execution enters next from the current position. With no
    /// current node this is the definition's entry node.
    pub fn next_from_current(
        &self,
        instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<Vec<NodeId>, CoreError> {
        let Some(current) = instance.current_node_id() else {
            return Ok(definition
                .first_node()
                .map(|node| vec![node.node_id])
                .unwrap_or_default());
        };

        let node = definition
            .node(current)
            .ok_or(CoreError::NodeNotFound(current.0))?;

        if node.gateway_type.is_split() {
            let strategy = self.registry.resolve(node.gateway_type)?;
            let next = strategy.next_nodes(current, instance, definition)?;
            debug!(
                gateway = current.0,
                strategy = strategy.name(),
                branches = next.len(),
                "gateway routed"
            );
            Ok(next)
        } else {
            Ok(node.next_node_ids.clone())
        }
    }

    /// Whether execution may enter a node. Joins are gated on convergence;
    /// everything else can always be entered.
    pub fn can_enter(
        &self,
        node: &FlowNode,
        instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<bool, CoreError> {
        if node.gateway_type.is_join() {
            let strategy = self.registry.resolve(node.gateway_type)?;
            return strategy.can_converge(node.node_id, instance, definition);
        }
        Ok(true)
    }

    /// Whether the node's skip condition fires for this instance. A broken
    /// skip condition never skips.
    pub fn should_skip(&self, node: &FlowNode, instance: &FlowInstance) -> Result<bool, CoreError> {
        let Some(expression) = node.skip_condition.as_deref() else {
            return Ok(false);
        };
        match self.evaluator.evaluate(expression, instance.process_variables()) {
            Ok(skip) => Ok(skip),
            Err(e) => {
                warn!(node_id = node.node_id.0, error = %e, "skip condition evaluation failed");
                Ok(false)
            }
        }
    }

    /// Whether execution can move past the current node: joins must be
    /// convergeable, splits always advance, and a task node needs a finished
    /// instance.
    pub fn can_advance(
        &self,
        instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<bool, CoreError> {
        let Some(current) = instance.current_node_id() else {
            return Ok(true);
        };

        let node = definition
            .node(current)
            .ok_or(CoreError::NodeNotFound(current.0))?;

        if node.gateway_type.is_join() {
            let strategy = self.registry.resolve(node.gateway_type)?;
            return strategy.can_converge(current, instance, definition);
        }
        if node.gateway_type.is_split() {
            return Ok(true);
        }

        Ok(instance
            .node_instances()
            .iter()
            .any(|n| n.node_id() == current && n.is_finished()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::factory::FlowInstanceFactory;
    use crate::domain::flow_definition::{FlowDefinition, GatewayType};
    use crate::domain::flow_instance::{DocumentId, FlowDefId, FlowMode, FlowType};
    use crate::domain::node_instance::NodeInstance;
    use crate::domain::process_variables::ProcessVariables;
    use serde_json::json;

    fn definition() -> FlowDefinition {
        FlowDefinition::new(
            FlowDefId(5),
            "two-step",
            vec![
                FlowNode::task(NodeId(1), FlowDefId(5), "manager review", 1)
                    .with_next(vec![NodeId(2)]),
                FlowNode::task(NodeId(2), FlowDefId(5), "hr review", 2)
                    .with_skip_condition("skipHr == true"),
            ],
        )
    }

    fn instance(vars: ProcessVariables) -> FlowInstance {
        FlowInstanceFactory::create(
            DocumentId(100),
            FlowDefId(5),
            FlowType::Issuance,
            FlowMode::Fixed,
            vars,
        )
    }

    #[test]
    fn test_entry_node_when_no_current() {
        let service = NodeRoutingService::with_default_strategies();
        let inst = instance(ProcessVariables::default());

        let next = service.next_from_current(&inst, &definition()).unwrap();
        assert_eq!(next, vec![NodeId(1)]);
    }

    #[test]
    fn test_next_follows_task_edges() {
        let service = NodeRoutingService::with_default_strategies();
        let mut inst = instance(ProcessVariables::default());
        inst.move_to_node(NodeId(1)).unwrap();

        let next = service.next_from_current(&inst, &definition()).unwrap();
        assert_eq!(next, vec![NodeId(2)]);
    }

    #[test]
    fn test_can_advance_requires_finished_task() {
        let service = NodeRoutingService::with_default_strategies();
        let def = definition();
        let mut inst = instance(ProcessVariables::default());
        inst.move_to_node(NodeId(1)).unwrap();
        inst.add_node_instance(NodeInstance::new(None, NodeId(1), None))
            .unwrap();

        assert!(!service.can_advance(&inst, &def).unwrap());

        inst.complete_node(NodeId(1), None).unwrap();
        assert!(service.can_advance(&inst, &def).unwrap());
    }

    #[test]
    fn test_should_skip_follows_condition() {
        let service = NodeRoutingService::with_default_strategies();
        let def = definition();
        let hr_node = def.node(NodeId(2)).unwrap();

        let skipping = instance(ProcessVariables::from_iter([("skipHr", json!(true))]));
        assert!(service.should_skip(hr_node, &skipping).unwrap());

        let keeping = instance(ProcessVariables::default());
        assert!(!service.should_skip(hr_node, &keeping).unwrap());
    }

    #[test]
    fn test_join_gating_via_can_enter() {
        let service = NodeRoutingService::with_default_strategies();
        let def = FlowDefinition::new(
            FlowDefId(5),
            "fork-join",
            vec![
                FlowNode::gateway(NodeId(1), FlowDefId(5), "fork", 1, GatewayType::ParallelSplit)
                    .with_next(vec![NodeId(2), NodeId(3)]),
                FlowNode::task(NodeId(2), FlowDefId(5), "a", 2).with_next(vec![NodeId(4)]),
                FlowNode::task(NodeId(3), FlowDefId(5), "b", 3).with_next(vec![NodeId(4)]),
                FlowNode::gateway(NodeId(4), FlowDefId(5), "join", 4, GatewayType::ParallelJoin),
            ],
        );
        let join = def.node(NodeId(4)).unwrap();

        let mut inst = instance(ProcessVariables::default());
        inst.add_node_instance(NodeInstance::new(None, NodeId(2), None))
            .unwrap();
        inst.add_node_instance(NodeInstance::new(None, NodeId(3), None))
            .unwrap();
        inst.complete_node(NodeId(2), None).unwrap();

        assert!(!service.can_enter(join, &inst, &def).unwrap());

        inst.complete_node(NodeId(3), None).unwrap();
        assert!(service.can_enter(join, &inst, &def).unwrap());
    }
}
