//! Business-rule predicates over the flow instance aggregate.
//!
//! Specifications are pure and side-effect free: they take an aggregate
//! snapshot and return a boolean. The calling layer gates destructive
//! operations on them before attempting the operation; a `false` result is
//! a denial, not an error.

use crate::domain::approver::UserId;
use crate::domain::flow_instance::{FlowInstance, NodeId};
use crate::domain::process_variables::ProcessVariables;

/// Whether `user_id` may withdraw the flow.
///
/// Satisfied iff the flow is still Processing, the caller is the initiator
/// recorded in the `initiatorId` process variable (numeric identity, string
/// values coerce; an absent variable denies), and no approval step has
/// completed yet.
pub fn flow_can_be_withdrawn(instance: &FlowInstance, user_id: UserId) -> bool {
    if !instance.status().is_processing() {
        return false;
    }

    let Some(initiator_id) = instance
        .process_variables()
        .get_i64(ProcessVariables::INITIATOR_ID)
    else {
        // cannot determine the initiator: deny
        return false;
    };
    if initiator_id != user_id.0 {
        return false;
    }

    !instance.has_completed_node()
}

/// Whether the flow may roll back to `target_node_id`.
///
/// Satisfied iff the flow is still Processing and a node instance for the
/// target node has completed. Node-order precedence between the target and
/// the current execution point is intentionally not checked: rollback to
/// any completed node is allowed.
pub fn flow_can_rollback(instance: &FlowInstance, target_node_id: NodeId) -> bool {
    if !instance.status().is_processing() {
        return false;
    }

    instance
        .node_instances()
        .iter()
        .any(|node| node.node_id() == target_node_id && node.is_completed())
}
