use crate::{
    domain::flow_definition::{FlowDefinition, FlowNode, GatewayMode, GatewayType},
    domain::flow_instance::{FlowInstance, NodeId},
    domain::process_variables::ProcessVariables,
    CoreError,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Evaluates a branch or skip condition against the process variables
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate the expression; a non-boolean outcome coerces by truthiness
    fn evaluate(&self, expression: &str, variables: &ProcessVariables)
        -> Result<bool, CoreError>;
}

/// Default condition evaluator.
///
/// Supports `&&`-joined comparison clauses of a process variable against a
/// literal (`amount > 1000`, `#urgent == true`, `category == 'contract'`)
/// and bare-variable truthiness (`urgent`). A leading `#` on variable names
/// is accepted and stripped. A missing variable makes its clause false.
pub struct SimpleConditionEvaluator;

enum Literal {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl SimpleConditionEvaluator {
    const OPERATORS: [&'static str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

    fn var_name(raw: &str) -> &str {
        raw.trim().trim_start_matches('#')
    }

    fn parse_literal(raw: &str) -> Literal {
        let trimmed = raw.trim();
        match trimmed {
            "true" => return Literal::Bool(true),
            "false" => return Literal::Bool(false),
            _ => {}
        }
        for quote in ['\'', '"'] {
            if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
                return Literal::Str(trimmed[1..trimmed.len() - 1].to_string());
            }
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return Literal::Num(n);
        }
        Literal::Str(trimmed.to_string())
    }

    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn values_equal(value: &Value, literal: &Literal) -> bool {
        match literal {
            Literal::Num(n) => Self::as_number(value) == Some(*n),
            Literal::Str(s) => value.as_str() == Some(s.as_str()),
            Literal::Bool(b) => value.as_bool() == Some(*b),
        }
    }

    fn truthy(value: Option<&Value>) -> bool {
        match value {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    fn eval_clause(clause: &str, variables: &ProcessVariables) -> Result<bool, CoreError> {
        for op in Self::OPERATORS {
            if let Some(idx) = clause.find(op) {
                let left = Self::var_name(&clause[..idx]);
                let literal = Self::parse_literal(&clause[idx + op.len()..]);
                let value = variables.get(left);

                return match op {
                    "==" => Ok(value.map(|v| Self::values_equal(v, &literal)).unwrap_or(false)),
                    "!=" => Ok(!value.map(|v| Self::values_equal(v, &literal)).unwrap_or(false)),
                    _ => {
                        let Literal::Num(rhs) = literal else {
                            return Err(CoreError::ValidationError(format!(
                                "ordered comparison against a non-numeric literal: `{}`",
                                clause.trim()
                            )));
                        };
                        let Some(lhs) = value.and_then(Self::as_number) else {
                            return Ok(false);
                        };
                        Ok(match op {
                            ">=" => lhs >= rhs,
                            "<=" => lhs <= rhs,
                            ">" => lhs > rhs,
                            "<" => lhs < rhs,
                            _ => unreachable!(),
                        })
                    }
                };
            }
        }

        Ok(Self::truthy(variables.get(Self::var_name(clause))))
    }
}

impl ConditionEvaluator for SimpleConditionEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        variables: &ProcessVariables,
    ) -> Result<bool, CoreError> {
        if expression.trim().is_empty() {
            warn!("empty condition expression evaluates to false");
            return Ok(false);
        }

        for clause in expression.split("&&") {
            if !Self::eval_clause(clause, variables)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Policy resolving how a gateway routes execution.
///
/// Strategies are pure functions over the aggregate and definition
/// snapshots: `can_converge` performs no side effects and is safe to probe
/// repeatedly while concurrent branch completions race toward a join.
pub trait GatewayRoutingStrategy: Send + Sync {
    /// Compute the outgoing branches taken from a split gateway
    fn next_nodes(
        &self,
        gateway_node_id: NodeId,
        instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<Vec<NodeId>, CoreError>;

    /// Whether all required incoming branches of a join have arrived
    fn can_converge(
        &self,
        join_node_id: NodeId,
        instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<bool, CoreError>;

    /// Whether this strategy handles the given gateway type
    fn supports(&self, gateway_type: GatewayType) -> bool;

    /// Strategy name for diagnostics
    fn name(&self) -> &'static str;
}

fn gateway_node<'a>(
    definition: &'a FlowDefinition,
    node_id: NodeId,
    expected: GatewayType,
) -> Result<&'a FlowNode, CoreError> {
    let node = definition
        .node(node_id)
        .ok_or(CoreError::NodeNotFound(node_id.0))?;
    if node.gateway_type != expected {
        return Err(CoreError::ValidationError(format!(
            "node {} is not a {:?} gateway",
            node_id.0, expected
        )));
    }
    Ok(node)
}

/// Routing for parallel gateways: the split fans out to every branch; the
/// join converges per the gateway mode (countersign or or-sign).
pub struct ParallelGatewayStrategy;

impl GatewayRoutingStrategy for ParallelGatewayStrategy {
    fn next_nodes(
        &self,
        gateway_node_id: NodeId,
        _instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<Vec<NodeId>, CoreError> {
        let node = gateway_node(definition, gateway_node_id, GatewayType::ParallelSplit)?;
        Ok(node.next_node_ids.clone())
    }

    fn can_converge(
        &self,
        join_node_id: NodeId,
        instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<bool, CoreError> {
        let join = gateway_node(definition, join_node_id, GatewayType::ParallelJoin)?;
        let mode = join.gateway_mode.unwrap_or(GatewayMode::All);

        let predecessors = definition.predecessors_of(join_node_id);
        if predecessors.is_empty() {
            return Ok(false);
        }

        let converged = if mode.is_all() {
            // countersign: every branch has instances and all of them finished
            predecessors.iter().all(|pred| {
                let mut seen = false;
                let all_finished = instance
                    .node_instances()
                    .iter()
                    .filter(|n| n.node_id() == pred.node_id)
                    .all(|n| {
                        seen = true;
                        n.is_finished()
                    });
                seen && all_finished
            })
        } else {
            // or-sign: any finished instance on any branch
            predecessors.iter().any(|pred| {
                instance
                    .node_instances()
                    .iter()
                    .any(|n| n.node_id() == pred.node_id && n.is_finished())
            })
        };

        Ok(converged)
    }

    fn supports(&self, gateway_type: GatewayType) -> bool {
        matches!(
            gateway_type,
            GatewayType::ParallelSplit | GatewayType::ParallelJoin
        )
    }

    fn name(&self) -> &'static str {
        "ParallelGatewayStrategy"
    }
}

/// Routing for condition (exclusive) gateways: the split evaluates each
/// branch condition against the process variables and takes the first
/// matching branch, falling back to the unconditional default branch.
pub struct ConditionGatewayStrategy {
    evaluator: Arc<dyn ConditionEvaluator>,
}

impl ConditionGatewayStrategy {
    /// Create the strategy over a condition evaluator
    pub fn new(evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        Self { evaluator }
    }
}

impl Default for ConditionGatewayStrategy {
    fn default() -> Self {
        Self::new(Arc::new(SimpleConditionEvaluator))
    }
}

impl GatewayRoutingStrategy for ConditionGatewayStrategy {
    fn next_nodes(
        &self,
        gateway_node_id: NodeId,
        instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<Vec<NodeId>, CoreError> {
        let node = gateway_node(definition, gateway_node_id, GatewayType::ConditionSplit)?;
        let variables = instance.process_variables();

        let mut default_branch = None;
        for target in &node.next_node_ids {
            match node.branch_conditions.get(target) {
                Some(expression) => match self.evaluator.evaluate(expression, variables) {
                    Ok(true) => return Ok(vec![*target]),
                    Ok(false) => {}
                    Err(e) => {
                        // a broken condition never selects its branch
                        warn!(
                            gateway_node_id = gateway_node_id.0,
                            target = target.0,
                            error = %e,
                            "branch condition evaluation failed"
                        );
                    }
                },
                None => {
                    if default_branch.is_none() {
                        default_branch = Some(*target);
                    }
                }
            }
        }

        default_branch.map(|d| vec![d]).ok_or_else(|| {
            CoreError::ResolutionFailure(format!(
                "no branch condition matched at gateway {} and no default branch exists",
                gateway_node_id.0
            ))
        })
    }

    fn can_converge(
        &self,
        join_node_id: NodeId,
        instance: &FlowInstance,
        definition: &FlowDefinition,
    ) -> Result<bool, CoreError> {
        let _ = gateway_node(definition, join_node_id, GatewayType::ConditionJoin)?;

        // an exclusive gateway activates one branch, so one finished
        // predecessor instance opens the join
        Ok(definition.predecessors_of(join_node_id).iter().any(|pred| {
            instance
                .node_instances()
                .iter()
                .any(|n| n.node_id() == pred.node_id && n.is_finished())
        }))
    }

    fn supports(&self, gateway_type: GatewayType) -> bool {
        matches!(
            gateway_type,
            GatewayType::ConditionSplit | GatewayType::ConditionJoin
        )
    }

    fn name(&self) -> &'static str {
        "ConditionGatewayStrategy"
    }
}
