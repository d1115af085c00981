//! A canned organization directory implementing the approver resolution
//! interface, for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;

use greenlight_core::{Approver, ApproverProvider, CoreError, DeptId, RoleId, UserId};

/// Static directory of users, role memberships and department leaders.
///
/// Unknown ids resolve to nothing (they are absent from the result), the way
/// a live directory omits deactivated accounts.
pub struct StaticApproverProvider {
    users: HashMap<i64, Approver>,
    role_members: HashMap<i64, Vec<UserId>>,
    dept_leaders: HashMap<i64, UserId>,
}

impl StaticApproverProvider {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            role_members: HashMap::new(),
            dept_leaders: HashMap::new(),
        }
    }

    /// Add a user
    pub fn with_user(mut self, user_id: UserId, name: &str) -> Self {
        let approver = Approver::new(user_id)
            .expect("static directory user id must be positive")
            .named(name, None);
        self.users.insert(user_id.0, approver);
        self
    }

    /// Add a role and its members (members must already be registered users)
    pub fn with_role(mut self, role_id: RoleId, members: Vec<UserId>) -> Self {
        self.role_members.insert(role_id.0, members);
        self
    }

    /// Add a department and its leader (must already be a registered user)
    pub fn with_dept_leader(mut self, dept_id: DeptId, leader: UserId) -> Self {
        self.dept_leaders.insert(dept_id.0, leader);
        self
    }

    fn lookup(&self, user_id: UserId) -> Option<Approver> {
        self.users.get(&user_id.0).cloned()
    }
}

impl Default for StaticApproverProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApproverProvider for StaticApproverProvider {
    async fn approvers_by_user_ids(&self, user_ids: &[UserId]) -> Result<Vec<Approver>, CoreError> {
        Ok(user_ids.iter().filter_map(|id| self.lookup(*id)).collect())
    }

    async fn dept_leaders_by_dept_ids(
        &self,
        dept_ids: &[DeptId],
    ) -> Result<Vec<Approver>, CoreError> {
        let mut approvers = Vec::new();
        for dept_id in dept_ids {
            if let Some(leader) = self.dept_leaders.get(&dept_id.0) {
                if let Some(approver) = self.lookup(*leader) {
                    let leader_in_dept = Approver::with_dept(approver.user_id(), *dept_id)?
                        .named(approver.user_name().unwrap_or_default(), None);
                    if !approvers.contains(&leader_in_dept) {
                        approvers.push(leader_in_dept);
                    }
                }
            }
        }
        Ok(approvers)
    }

    async fn users_by_role_ids(&self, role_ids: &[RoleId]) -> Result<Vec<Approver>, CoreError> {
        let mut approvers = Vec::new();
        for role_id in role_ids {
            for member in self.role_members.get(&role_id.0).into_iter().flatten() {
                if let Some(approver) = self.lookup(*member) {
                    if !approvers.contains(&approver) {
                        approvers.push(approver);
                    }
                }
            }
        }
        Ok(approvers)
    }
}
