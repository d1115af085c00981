use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Value object: User ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Value object: Department ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeptId(pub i64);

/// Value object: Role ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub i64);

/// Value object: the resolved target of an approval task.
///
/// Produced by an assignment strategy from configuration like "department
/// head of dept 12"; immutable once produced. Display names are carried for
/// task lists and notifications; identity is `(user_id, dept_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approver {
    user_id: UserId,
    dept_id: Option<DeptId>,
    user_name: Option<String>,
    dept_name: Option<String>,
}

impl Approver {
    /// Create an approver for a user
    pub fn new(user_id: UserId) -> Result<Self, CoreError> {
        if user_id.0 <= 0 {
            return Err(CoreError::ValidationError(
                "approver user id must be a positive number".to_string(),
            ));
        }
        Ok(Self {
            user_id,
            dept_id: None,
            user_name: None,
            dept_name: None,
        })
    }

    /// Create an approver for a user acting within a department
    pub fn with_dept(user_id: UserId, dept_id: DeptId) -> Result<Self, CoreError> {
        let mut approver = Self::new(user_id)?;
        approver.dept_id = Some(dept_id);
        Ok(approver)
    }

    /// Attach display names
    pub fn named(mut self, user_name: &str, dept_name: Option<&str>) -> Self {
        self.user_name = Some(user_name.to_string());
        self.dept_name = dept_name.map(str::to_string);
        self
    }

    /// The resolved user
    #[inline]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The department context, if any
    #[inline]
    pub fn dept_id(&self) -> Option<DeptId> {
        self.dept_id
    }

    /// Display name of the user
    #[inline]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Display name of the department
    #[inline]
    pub fn dept_name(&self) -> Option<&str> {
        self.dept_name.as_deref()
    }
}

// Equality is identity-based: names are display data.
impl PartialEq for Approver {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.dept_id == other.dept_id
    }
}

impl Eq for Approver {}

impl Hash for Approver {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_id.hash(state);
        self.dept_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_user_id() {
        assert!(Approver::new(UserId(0)).is_err());
        assert!(Approver::new(UserId(-3)).is_err());
        assert!(Approver::new(UserId(1)).is_ok());
    }

    #[test]
    fn test_equality_ignores_names() {
        let a = Approver::with_dept(UserId(7), DeptId(2))
            .unwrap()
            .named("Alice", Some("Finance"));
        let b = Approver::with_dept(UserId(7), DeptId(2)).unwrap();
        let c = Approver::new(UserId(7)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c); // different dept context
    }

    #[test]
    fn test_serialization_roundtrip() {
        let approver = Approver::with_dept(UserId(7), DeptId(2))
            .unwrap()
            .named("Alice", Some("Finance"));

        let serialized = serde_json::to_string(&approver).unwrap();
        let deserialized: Approver = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, approver);
        assert_eq!(deserialized.user_name(), Some("Alice"));
        assert_eq!(deserialized.dept_name(), Some("Finance"));
    }
}
