use crate::{
    domain::flow_instance::{FlowDefId, NodeId},
    CoreError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Gateway type of a definition node. Gateways control how execution
/// branches and merges; plain task nodes carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayType {
    /// Not a gateway (plain task node)
    None,

    /// Parallel gateway, fan-out side
    ParallelSplit,

    /// Parallel gateway, merge side
    ParallelJoin,

    /// Condition (exclusive) gateway, branch side
    ConditionSplit,

    /// Condition gateway, merge side
    ConditionJoin,
}

impl GatewayType {
    /// Numeric code used at the persistence boundary
    pub fn code(&self) -> i32 {
        match self {
            GatewayType::None => 0,
            GatewayType::ParallelSplit => 1,
            GatewayType::ParallelJoin => 2,
            GatewayType::ConditionSplit => 3,
            GatewayType::ConditionJoin => 4,
        }
    }

    /// Build from a persisted numeric code
    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        match code {
            0 => Ok(GatewayType::None),
            1 => Ok(GatewayType::ParallelSplit),
            2 => Ok(GatewayType::ParallelJoin),
            3 => Ok(GatewayType::ConditionSplit),
            4 => Ok(GatewayType::ConditionJoin),
            other => Err(CoreError::ValidationError(format!(
                "invalid gateway type value: {}",
                other
            ))),
        }
    }

    /// Whether the node is a gateway at all
    #[inline]
    pub fn is_gateway(&self) -> bool {
        !matches!(self, GatewayType::None)
    }

    /// Whether the gateway fans out
    #[inline]
    pub fn is_split(&self) -> bool {
        matches!(self, GatewayType::ParallelSplit | GatewayType::ConditionSplit)
    }

    /// Whether the gateway merges branches
    #[inline]
    pub fn is_join(&self) -> bool {
        matches!(self, GatewayType::ParallelJoin | GatewayType::ConditionJoin)
    }

    /// Whether this is one of the parallel gateway halves
    #[inline]
    pub fn is_parallel(&self) -> bool {
        matches!(self, GatewayType::ParallelSplit | GatewayType::ParallelJoin)
    }

    /// Whether this is one of the condition gateway halves
    #[inline]
    pub fn is_condition(&self) -> bool {
        matches!(self, GatewayType::ConditionSplit | GatewayType::ConditionJoin)
    }
}

/// Merge policy of a parallel join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayMode {
    /// Countersign: every incoming branch must finish before the join opens
    All,

    /// Or-sign: any one finished branch opens the join
    Any,
}

impl GatewayMode {
    /// Countersign check
    #[inline]
    pub fn is_all(&self) -> bool {
        matches!(self, GatewayMode::All)
    }

    /// Or-sign check
    #[inline]
    pub fn is_any(&self) -> bool {
        matches!(self, GatewayMode::Any)
    }
}

/// How a task node's approver configuration is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApproverType {
    /// `approver_value` is a list of user ids
    User,

    /// `approver_value` is a list of role ids; every member approves
    Role,

    /// `approver_value` is a list of department ids; their leaders approve
    DeptLeader,

    /// Approvers come from the `approverIds` process variable
    Initiator,
}

impl ApproverType {
    /// Numeric code used at the persistence boundary
    pub fn code(&self) -> i32 {
        match self {
            ApproverType::User => 1,
            ApproverType::Role => 2,
            ApproverType::DeptLeader => 3,
            ApproverType::Initiator => 4,
        }
    }

    /// Build from a persisted numeric code
    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        match code {
            1 => Ok(ApproverType::User),
            2 => Ok(ApproverType::Role),
            3 => Ok(ApproverType::DeptLeader),
            4 => Ok(ApproverType::Initiator),
            other => Err(CoreError::ValidationError(format!(
                "invalid approver type value: {}",
                other
            ))),
        }
    }
}

/// A node in the flow definition graph: either an approval task or a
/// gateway. Definition data is inert configuration; routing and assignment
/// read it, nothing mutates it at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    /// ID of the node within the definition graph
    pub node_id: NodeId,

    /// The definition this node belongs to
    pub flow_def_id: FlowDefId,

    /// Human-readable name of the step
    pub name: String,

    /// Ordering hint; the lowest order number is the entry node
    pub order_num: i32,

    /// How to interpret `approver_value` (task nodes only)
    pub approver_type: Option<ApproverType>,

    /// Approver configuration value, e.g. "3,7" or "[3, 7]"
    pub approver_value: Option<String>,

    /// Gateway classification; `GatewayType::None` for task nodes
    pub gateway_type: GatewayType,

    /// Merge policy for parallel joins
    pub gateway_mode: Option<GatewayMode>,

    /// Outgoing edges
    pub next_node_ids: Vec<NodeId>,

    /// Branch conditions keyed by target node; branches without an entry
    /// are unconditional defaults
    pub branch_conditions: BTreeMap<NodeId, String>,

    /// When this evaluates true against the process variables the node is
    /// skipped instead of activated
    pub skip_condition: Option<String>,
}

impl FlowNode {
    /// Create a task node
    pub fn task(node_id: NodeId, flow_def_id: FlowDefId, name: &str, order_num: i32) -> Self {
        Self {
            node_id,
            flow_def_id,
            name: name.to_string(),
            order_num,
            approver_type: None,
            approver_value: None,
            gateway_type: GatewayType::None,
            gateway_mode: None,
            next_node_ids: Vec::new(),
            branch_conditions: BTreeMap::new(),
            skip_condition: None,
        }
    }

    /// Create a gateway node
    pub fn gateway(
        node_id: NodeId,
        flow_def_id: FlowDefId,
        name: &str,
        order_num: i32,
        gateway_type: GatewayType,
    ) -> Self {
        let mut node = Self::task(node_id, flow_def_id, name, order_num);
        node.gateway_type = gateway_type;
        node
    }

    /// Set the approver configuration
    pub fn with_approver(mut self, approver_type: ApproverType, approver_value: &str) -> Self {
        self.approver_type = Some(approver_type);
        self.approver_value = Some(approver_value.to_string());
        self
    }

    /// Set the outgoing edges
    pub fn with_next(mut self, next_node_ids: Vec<NodeId>) -> Self {
        self.next_node_ids = next_node_ids;
        self
    }

    /// Set a branch condition for one outgoing edge
    pub fn with_branch_condition(mut self, target: NodeId, expression: &str) -> Self {
        self.branch_conditions.insert(target, expression.to_string());
        self
    }

    /// Set the merge policy (parallel joins)
    pub fn with_gateway_mode(mut self, mode: GatewayMode) -> Self {
        self.gateway_mode = Some(mode);
        self
    }

    /// Set the skip condition
    pub fn with_skip_condition(mut self, expression: &str) -> Self {
        self.skip_condition = Some(expression.to_string());
        self
    }

    /// Whether this node is a gateway
    #[inline]
    pub fn is_gateway(&self) -> bool {
        self.gateway_type.is_gateway()
    }
}

/// Represents a validated flow definition: the template a flow instance runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// ID of the definition
    pub id: FlowDefId,

    /// Human-readable name
    pub name: String,

    /// The definition version string
    pub version: String,

    /// The nodes of the graph
    pub nodes: Vec<FlowNode>,
}

impl FlowDefinition {
    /// Create a definition from nodes
    pub fn new(id: FlowDefId, name: &str, nodes: Vec<FlowNode>) -> Self {
        Self {
            id,
            name: name.to_string(),
            version: "1".to_string(),
            nodes,
        }
    }

    /// Look up a node by id
    pub fn node(&self, node_id: NodeId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// The entry node: lowest order number
    pub fn first_node(&self) -> Option<&FlowNode> {
        self.nodes.iter().min_by_key(|n| n.order_num)
    }

    /// All nodes with an edge into `node_id`
    pub fn predecessors_of(&self, node_id: NodeId) -> Vec<&FlowNode> {
        self.nodes
            .iter()
            .filter(|n| n.next_node_ids.contains(&node_id))
            .collect()
    }

    /// Validate the definition graph
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.nodes.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "flow definition {} has no nodes",
                self.id.0
            )));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.node_id) {
                return Err(CoreError::ValidationError(format!(
                    "duplicate node id {} in flow definition {}",
                    node.node_id.0, self.id.0
                )));
            }
        }

        for node in &self.nodes {
            for next in &node.next_node_ids {
                if !seen.contains(next) {
                    return Err(CoreError::ValidationError(format!(
                        "node {} references unknown next node {}",
                        node.node_id.0, next.0
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_definition() -> FlowDefinition {
        FlowDefinition::new(
            FlowDefId(5),
            "leave request",
            vec![
                FlowNode::task(NodeId(1), FlowDefId(5), "manager review", 1)
                    .with_approver(ApproverType::User, "7")
                    .with_next(vec![NodeId(2)]),
                FlowNode::task(NodeId(2), FlowDefId(5), "hr review", 2)
                    .with_approver(ApproverType::Role, "3"),
            ],
        )
    }

    #[test]
    fn test_lookup_and_first_node() {
        let def = two_step_definition();

        assert_eq!(def.first_node().unwrap().node_id, NodeId(1));
        assert!(def.node(NodeId(2)).is_some());
        assert!(def.node(NodeId(99)).is_none());
    }

    #[test]
    fn test_predecessors() {
        let def = two_step_definition();

        let preds = def.predecessors_of(NodeId(2));
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].node_id, NodeId(1));
        assert!(def.predecessors_of(NodeId(1)).is_empty());
    }

    #[test]
    fn test_validate_accepts_well_formed_graph() {
        assert!(two_step_definition().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_and_broken_graphs() {
        let empty = FlowDefinition::new(FlowDefId(5), "empty", vec![]);
        assert!(empty.validate().is_err());

        let dangling = FlowDefinition::new(
            FlowDefId(5),
            "dangling",
            vec![FlowNode::task(NodeId(1), FlowDefId(5), "a", 1).with_next(vec![NodeId(9)])],
        );
        assert!(dangling.validate().is_err());

        let duplicated = FlowDefinition::new(
            FlowDefId(5),
            "dup",
            vec![
                FlowNode::task(NodeId(1), FlowDefId(5), "a", 1),
                FlowNode::task(NodeId(1), FlowDefId(5), "b", 2),
            ],
        );
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn test_gateway_type_helpers() {
        assert!(GatewayType::ParallelSplit.is_split());
        assert!(GatewayType::ParallelSplit.is_parallel());
        assert!(GatewayType::ConditionJoin.is_join());
        assert!(GatewayType::ConditionJoin.is_condition());
        assert!(!GatewayType::None.is_gateway());
    }

    #[test]
    fn test_code_roundtrips() {
        for gt in [
            GatewayType::None,
            GatewayType::ParallelSplit,
            GatewayType::ParallelJoin,
            GatewayType::ConditionSplit,
            GatewayType::ConditionJoin,
        ] {
            assert_eq!(GatewayType::from_code(gt.code()).unwrap(), gt);
        }
        for at in [
            ApproverType::User,
            ApproverType::Role,
            ApproverType::DeptLeader,
            ApproverType::Initiator,
        ] {
            assert_eq!(ApproverType::from_code(at.code()).unwrap(), at);
        }
        assert!(ApproverType::from_code(0).is_err());
    }
}
