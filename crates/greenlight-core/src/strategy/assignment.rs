use crate::{
    domain::approver::{Approver, DeptId, RoleId, UserId},
    domain::flow_definition::ApproverType,
    domain::flow_instance::FlowInstanceId,
    domain::process_variables::ProcessVariables,
    domain::repository::ApproverProvider,
    CoreError,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Policy resolving who approves a node.
///
/// A strategy advertises the approver types it supports and a priority;
/// among supporting strategies the lowest priority value wins. Resolution
/// that yields no valid target is a [`CoreError::ResolutionFailure`] — the
/// aggregate is untouched and the caller may retry with corrected
/// configuration.
#[async_trait]
pub trait ApproverAssignmentStrategy: Send + Sync {
    /// Resolve the approver configuration value into concrete approvers
    async fn assign(
        &self,
        approver_value: &str,
        flow_instance_id: Option<FlowInstanceId>,
        variables: &ProcessVariables,
    ) -> Result<Vec<Approver>, CoreError>;

    /// Whether this strategy handles the given approver type
    fn supports(&self, approver_type: ApproverType) -> bool;

    /// Strategy priority; lower wins when several strategies support a type
    fn priority(&self) -> i32 {
        100
    }

    /// Strategy name for diagnostics
    fn name(&self) -> &'static str;
}

/// Parse an id list configured as either comma-separated integers
/// ("3, 7, 12") or a JSON array ("[3, 7, 12]").
fn parse_id_list(value: &str) -> Result<Vec<i64>, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<i64>>(trimmed).map_err(|e| {
            CoreError::ResolutionFailure(format!("invalid id list `{}`: {}", value, e))
        });
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|e| {
                CoreError::ResolutionFailure(format!("invalid id list `{}`: {}", value, e))
            })
        })
        .collect()
}

fn no_target(what: &str, detail: &str) -> CoreError {
    CoreError::ResolutionFailure(format!("no {} resolved from `{}`", what, detail))
}

/// Assigns the users listed in the node configuration
pub struct UserApproverStrategy {
    provider: Arc<dyn ApproverProvider>,
}

impl UserApproverStrategy {
    /// Create the strategy over an approver provider
    pub fn new(provider: Arc<dyn ApproverProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ApproverAssignmentStrategy for UserApproverStrategy {
    async fn assign(
        &self,
        approver_value: &str,
        flow_instance_id: Option<FlowInstanceId>,
        _variables: &ProcessVariables,
    ) -> Result<Vec<Approver>, CoreError> {
        let user_ids: Vec<UserId> = parse_id_list(approver_value)?
            .into_iter()
            .map(UserId)
            .collect();
        if user_ids.is_empty() {
            return Err(no_target("approver users", approver_value));
        }

        let approvers = self.provider.approvers_by_user_ids(&user_ids).await?;
        if approvers.is_empty() {
            return Err(no_target("approver users", approver_value));
        }

        debug!(
            flow_instance_id = ?flow_instance_id.map(|id| id.0),
            requested = user_ids.len(),
            resolved = approvers.len(),
            "assigned user approvers"
        );
        Ok(approvers)
    }

    fn supports(&self, approver_type: ApproverType) -> bool {
        approver_type == ApproverType::User
    }

    fn priority(&self) -> i32 {
        10
    }

    fn name(&self) -> &'static str {
        "UserApproverStrategy"
    }
}

/// Assigns every member of the roles listed in the node configuration
pub struct RoleApproverStrategy {
    provider: Arc<dyn ApproverProvider>,
}

impl RoleApproverStrategy {
    /// Create the strategy over an approver provider
    pub fn new(provider: Arc<dyn ApproverProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ApproverAssignmentStrategy for RoleApproverStrategy {
    async fn assign(
        &self,
        approver_value: &str,
        flow_instance_id: Option<FlowInstanceId>,
        _variables: &ProcessVariables,
    ) -> Result<Vec<Approver>, CoreError> {
        let role_ids: Vec<RoleId> = parse_id_list(approver_value)?
            .into_iter()
            .map(RoleId)
            .collect();
        if role_ids.is_empty() {
            return Err(no_target("roles", approver_value));
        }

        let approvers = self.provider.users_by_role_ids(&role_ids).await?;
        if approvers.is_empty() {
            return Err(no_target("role members", approver_value));
        }

        debug!(
            flow_instance_id = ?flow_instance_id.map(|id| id.0),
            roles = role_ids.len(),
            resolved = approvers.len(),
            "assigned role approvers"
        );
        Ok(approvers)
    }

    fn supports(&self, approver_type: ApproverType) -> bool {
        approver_type == ApproverType::Role
    }

    fn priority(&self) -> i32 {
        20
    }

    fn name(&self) -> &'static str {
        "RoleApproverStrategy"
    }
}

/// Assigns the leaders of the departments listed in the node configuration
pub struct DeptLeaderApproverStrategy {
    provider: Arc<dyn ApproverProvider>,
}

impl DeptLeaderApproverStrategy {
    /// Create the strategy over an approver provider
    pub fn new(provider: Arc<dyn ApproverProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ApproverAssignmentStrategy for DeptLeaderApproverStrategy {
    async fn assign(
        &self,
        approver_value: &str,
        flow_instance_id: Option<FlowInstanceId>,
        _variables: &ProcessVariables,
    ) -> Result<Vec<Approver>, CoreError> {
        let dept_ids: Vec<DeptId> = parse_id_list(approver_value)?
            .into_iter()
            .map(DeptId)
            .collect();
        if dept_ids.is_empty() {
            return Err(no_target("departments", approver_value));
        }

        let approvers = self.provider.dept_leaders_by_dept_ids(&dept_ids).await?;
        if approvers.is_empty() {
            return Err(no_target("department leaders", approver_value));
        }

        debug!(
            flow_instance_id = ?flow_instance_id.map(|id| id.0),
            departments = dept_ids.len(),
            resolved = approvers.len(),
            "assigned department leader approvers"
        );
        Ok(approvers)
    }

    fn supports(&self, approver_type: ApproverType) -> bool {
        approver_type == ApproverType::DeptLeader
    }

    fn priority(&self) -> i32 {
        30
    }

    fn name(&self) -> &'static str {
        "DeptLeaderApproverStrategy"
    }
}

/// Assigns the approvers the initiator chose when starting the process,
/// carried in the `approverIds` process variable. The node configuration
/// value is ignored.
pub struct InitiatorApproverStrategy {
    provider: Arc<dyn ApproverProvider>,
}

impl InitiatorApproverStrategy {
    /// Create the strategy over an approver provider
    pub fn new(provider: Arc<dyn ApproverProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ApproverAssignmentStrategy for InitiatorApproverStrategy {
    async fn assign(
        &self,
        _approver_value: &str,
        flow_instance_id: Option<FlowInstanceId>,
        variables: &ProcessVariables,
    ) -> Result<Vec<Approver>, CoreError> {
        let Some(raw) = variables.get(ProcessVariables::APPROVER_IDS) else {
            return Err(CoreError::ResolutionFailure(format!(
                "process variable `{}` is not set",
                ProcessVariables::APPROVER_IDS
            )));
        };

        let user_ids: Vec<UserId> = match raw {
            serde_json::Value::Array(_) => {
                serde_json::from_value::<Vec<i64>>(raw.clone()).map_err(|e| {
                    CoreError::ResolutionFailure(format!("invalid `approverIds` variable: {}", e))
                })?
            }
            serde_json::Value::String(s) => parse_id_list(s)?,
            other => {
                return Err(CoreError::ResolutionFailure(format!(
                    "invalid `approverIds` variable: {}",
                    other
                )))
            }
        }
        .into_iter()
        .map(UserId)
        .collect();

        if user_ids.is_empty() {
            return Err(no_target("initiator-chosen approvers", "approverIds"));
        }

        let approvers = self.provider.approvers_by_user_ids(&user_ids).await?;
        if approvers.is_empty() {
            return Err(no_target("initiator-chosen approvers", "approverIds"));
        }

        debug!(
            flow_instance_id = ?flow_instance_id.map(|id| id.0),
            resolved = approvers.len(),
            "assigned initiator-chosen approvers"
        );
        Ok(approvers)
    }

    fn supports(&self, approver_type: ApproverType) -> bool {
        approver_type == ApproverType::Initiator
    }

    fn priority(&self) -> i32 {
        40
    }

    fn name(&self) -> &'static str {
        "InitiatorApproverStrategy"
    }
}
