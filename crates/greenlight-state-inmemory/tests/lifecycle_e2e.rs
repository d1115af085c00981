//! End-to-end lifecycle scenarios over the in-memory state store: the
//! lifecycle service wired with versioned repositories, the static
//! directory, and real publisher implementations.

use serde_json::json;
use std::sync::Arc;

use greenlight_core::application::{
    ApproverAssignmentService, FlowLifecycleService, NodeRoutingService,
};
use greenlight_core::{
    ApproverType, CoreError, DeptId, DocumentId, FlowDefId, FlowDefinition, FlowInstanceRepository,
    FlowMode, FlowNode, FlowStatus, FlowType, NodeId, NodeStatus, ProcessVariables, RoleId, UserId,
};
use greenlight_state_inmemory::{
    FailingEventPublisher, InMemoryFlowDefinitionRepository, InMemoryFlowInstanceRepository,
    RecordingEventPublisher, StaticApproverProvider,
};

fn directory() -> StaticApproverProvider {
    StaticApproverProvider::new()
        .with_user(UserId(1), "Dana")
        .with_user(UserId(7), "Alice")
        .with_user(UserId(9), "Bo")
        .with_user(UserId(11), "Chen")
        .with_role(RoleId(3), vec![UserId(7), UserId(9)])
        .with_dept_leader(DeptId(2), UserId(11))
}

/// Issuance flow: manager review by listed user, then the finance
/// department leader, then everyone holding the auditor role.
fn issuance_definition() -> FlowDefinition {
    FlowDefinition::new(
        FlowDefId(5),
        "document issuance",
        vec![
            FlowNode::task(NodeId(1), FlowDefId(5), "manager review", 1)
                .with_approver(ApproverType::User, "7")
                .with_next(vec![NodeId(2)]),
            FlowNode::task(NodeId(2), FlowDefId(5), "dept leader review", 2)
                .with_approver(ApproverType::DeptLeader, "2")
                .with_next(vec![NodeId(3)]),
            FlowNode::task(NodeId(3), FlowDefId(5), "auditor countersign", 3)
                .with_approver(ApproverType::Role, "3"),
        ],
    )
}

struct World {
    service: FlowLifecycleService,
    instances: Arc<InMemoryFlowInstanceRepository>,
    publisher: Arc<RecordingEventPublisher>,
}

fn world(definitions: Vec<FlowDefinition>) -> World {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let instances = Arc::new(InMemoryFlowInstanceRepository::new());
    let publisher = Arc::new(RecordingEventPublisher::new());
    let service = FlowLifecycleService::new(
        instances.clone(),
        Arc::new(InMemoryFlowDefinitionRepository::with_definitions(definitions)),
        ApproverAssignmentService::with_default_strategies(Arc::new(directory())),
        NodeRoutingService::with_default_strategies(),
        publisher.clone(),
    );
    World {
        service,
        instances,
        publisher,
    }
}

#[tokio::test]
async fn full_issuance_flow_reaches_completion() {
    let w = world(vec![issuance_definition()]);

    let id = w
        .service
        .create_flow(
            DocumentId(100),
            FlowDefId(5),
            FlowType::Issuance,
            FlowMode::Fixed,
            ProcessVariables::from_iter([("initiatorId", json!(1))]),
        )
        .await
        .unwrap();

    // manager review pending for Alice
    let instance = w.service.get_flow(id).await.unwrap();
    assert_eq!(instance.node_instances().len(), 1);
    assert_eq!(
        instance.node_instances()[0].approver().unwrap().user_id(),
        UserId(7)
    );

    // manager approves; the finance leader is next
    w.service
        .approve_node(id, NodeId(1), Some("approved".to_string()))
        .await
        .unwrap();
    let instance = w.service.get_flow(id).await.unwrap();
    let leader = instance.node_instances().last().unwrap();
    assert_eq!(leader.approver().unwrap().user_id(), UserId(11));
    assert_eq!(leader.approver().unwrap().dept_id(), Some(DeptId(2)));

    // leader approves; both auditors get a task
    w.service.approve_node(id, NodeId(2), None).await.unwrap();
    let instance = w.service.get_flow(id).await.unwrap();
    let auditors: Vec<_> = instance
        .node_instances()
        .iter()
        .filter(|n| n.node_id() == NodeId(3))
        .collect();
    assert_eq!(auditors.len(), 2);

    // one auditor approves; the flow completes
    w.service.approve_node(id, NodeId(3), None).await.unwrap();
    let instance = w.service.get_flow(id).await.unwrap();
    assert_eq!(instance.status(), FlowStatus::Completed);
    assert!(instance.end_time().is_some());

    let types = w.publisher.event_types();
    assert!(types.contains(&"flow_instance.started".to_string()));
    assert!(types.contains(&"node_instance.created".to_string()));
    assert!(types.contains(&"node_instance.completed".to_string()));
    assert!(types.contains(&"flow_instance.completed".to_string()));

    // post-save events carry the persisted instance id
    let completed = w
        .publisher
        .recorded()
        .into_iter()
        .find(|e| e.event_type == "flow_instance.completed")
        .unwrap();
    assert_eq!(completed.flow_instance_id, Some(id));
}

#[tokio::test]
async fn initiator_chosen_approvers_flow() {
    let definition = FlowDefinition::new(
        FlowDefId(6),
        "free-form review",
        vec![FlowNode::task(NodeId(1), FlowDefId(6), "chosen reviewers", 1)
            .with_approver(ApproverType::Initiator, "")],
    );
    let w = world(vec![definition]);

    let id = w
        .service
        .create_flow(
            DocumentId(200),
            FlowDefId(6),
            FlowType::Receipt,
            FlowMode::Free,
            ProcessVariables::from_iter([
                ("initiatorId", json!(1)),
                ("approverIds", json!([7, 9])),
            ]),
        )
        .await
        .unwrap();

    let instance = w.service.get_flow(id).await.unwrap();
    let assigned: Vec<_> = instance
        .node_instances()
        .iter()
        .map(|n| n.approver().unwrap().user_id())
        .collect();
    assert_eq!(assigned, vec![UserId(7), UserId(9)]);
}

#[tokio::test]
async fn unresolvable_approver_aborts_creation() {
    // node configured with a user missing from the directory
    let definition = FlowDefinition::new(
        FlowDefId(7),
        "misconfigured",
        vec![FlowNode::task(NodeId(1), FlowDefId(7), "ghost review", 1)
            .with_approver(ApproverType::User, "404")],
    );
    let w = world(vec![definition]);

    let err = w
        .service
        .create_flow(
            DocumentId(300),
            FlowDefId(7),
            FlowType::Issuance,
            FlowMode::Fixed,
            ProcessVariables::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ResolutionFailure(_)));
    // nothing was persisted and nothing was published
    assert!(w.instances.is_empty());
    assert_eq!(w.publisher.count(), 0);
}

#[tokio::test]
async fn concurrent_writers_conflict_and_retry() {
    let w = world(vec![issuance_definition()]);
    let id = w
        .service
        .create_flow(
            DocumentId(100),
            FlowDefId(5),
            FlowType::Issuance,
            FlowMode::Fixed,
            ProcessVariables::from_iter([("initiatorId", json!(1))]),
        )
        .await
        .unwrap();

    // two clients load the same snapshot
    let mut suspender = w.instances.find_by_id(id).await.unwrap().unwrap();
    let mut completer = w.instances.find_by_id(id).await.unwrap().unwrap();

    suspender.suspend().unwrap();
    w.instances.save(&mut suspender).await.unwrap();

    completer.complete().unwrap();
    let err = w.instances.save(&mut completer).await.unwrap_err();
    assert!(matches!(err, CoreError::ConcurrencyConflict(_)));

    // the service path sees the suspended state after the race
    let instance = w.service.get_flow(id).await.unwrap();
    assert_eq!(instance.status(), FlowStatus::Suspended);
}

#[tokio::test]
async fn withdraw_and_rollback_through_the_store() {
    let w = world(vec![issuance_definition()]);
    let vars = ProcessVariables::from_iter([("initiatorId", json!(1))]);

    // withdraw before any approval
    let id = w
        .service
        .create_flow(
            DocumentId(100),
            FlowDefId(5),
            FlowType::Issuance,
            FlowMode::Fixed,
            vars.clone(),
        )
        .await
        .unwrap();
    w.service.withdraw_flow(id, UserId(1)).await.unwrap();
    let withdrawn = w.service.get_flow(id).await.unwrap();
    assert_eq!(withdrawn.status(), FlowStatus::Cancelled);

    // a second process: approve step one, then roll back to it
    let id = w
        .service
        .create_flow(
            DocumentId(101),
            FlowDefId(5),
            FlowType::Issuance,
            FlowMode::Fixed,
            vars,
        )
        .await
        .unwrap();
    w.service.approve_node(id, NodeId(1), None).await.unwrap();
    w.service.rollback_flow(id, NodeId(1)).await.unwrap();

    let rolled = w.service.get_flow(id).await.unwrap();
    assert_eq!(rolled.current_node_id(), Some(NodeId(1)));
    let fresh = rolled.node_instances().last().unwrap();
    assert_eq!(fresh.node_id(), NodeId(1));
    assert_eq!(fresh.status(), NodeStatus::Pending);
    assert!(rolled
        .node_instances()
        .iter()
        .any(|n| n.node_id() == NodeId(2) && n.status() == NodeStatus::Cancelled));
}

#[tokio::test]
async fn failing_sink_never_poisons_the_transaction() {
    let instances = Arc::new(InMemoryFlowInstanceRepository::new());
    let service = FlowLifecycleService::new(
        instances.clone(),
        Arc::new(InMemoryFlowDefinitionRepository::with_definitions(vec![
            issuance_definition(),
        ])),
        ApproverAssignmentService::with_default_strategies(Arc::new(directory())),
        NodeRoutingService::with_default_strategies(),
        Arc::new(FailingEventPublisher),
    );

    let id = service
        .create_flow(
            DocumentId(100),
            FlowDefId(5),
            FlowType::Issuance,
            FlowMode::Fixed,
            ProcessVariables::from_iter([("initiatorId", json!(1))]),
        )
        .await
        .unwrap();
    service.approve_node(id, NodeId(1), None).await.unwrap();

    let instance = service.get_flow(id).await.unwrap();
    assert_eq!(instance.status(), FlowStatus::Processing);
    assert!(instance.node_instances()[0].is_completed());
    // pending events were drained even though delivery failed
    assert!(instance.pending_events().is_empty());
}
