use crate::{
    error::HrmError,
    model::role::{Capability, Role},
};

/// The employee on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub employee_id: u64,
    pub role: Role,
}

impl AuthUser {
    pub fn new(employee_id: u64, role: Role) -> Self {
        Self { employee_id, role }
    }

    pub fn require(&self, capability: Capability) -> Result<(), HrmError> {
        if self.role.can(capability) {
            Ok(())
        } else {
            Err(HrmError::permission(format!(
                "{} role lacks {capability}",
                self.role
            )))
        }
    }

    /// Owners always pass; anyone else needs `capability`.
    pub fn require_owner_or(&self, owner_id: u64, capability: Capability) -> Result<(), HrmError> {
        if self.employee_id == owner_id {
            Ok(())
        } else {
            self.require(capability)
        }
    }

    /// Self-service actions: only the owner passes, whatever the role.
    pub fn require_owner(&self, owner_id: u64, action: &str) -> Result<(), HrmError> {
        if self.employee_id == owner_id {
            Ok(())
        } else {
            Err(HrmError::permission(format!("only the owning employee may {action}")))
        }
    }
}
