use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    auth::auth::AuthUser, directory::EmployeeDirectory, error::HrmError, model::role::Role,
};

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn role_of(&self, employee_id: u64) -> Result<Role, HrmError>;

    async fn is_hr_privileged(&self, employee_id: u64) -> Result<bool, HrmError> {
        Ok(self.role_of(employee_id).await?.is_hr_privileged())
    }

    async fn authenticate(&self, employee_id: u64) -> Result<AuthUser, HrmError> {
        let role = self.role_of(employee_id).await?;
        Ok(AuthUser::new(employee_id, role))
    }
}

/// Derives roles from directory entries: the explicit role when set,
/// otherwise the role implied by the position title.
pub struct DirectoryAuthorizer {
    directory: Arc<dyn EmployeeDirectory>,
}

impl DirectoryAuthorizer {
    pub fn new(directory: Arc<dyn EmployeeDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Authorizer for DirectoryAuthorizer {
    async fn role_of(&self, employee_id: u64) -> Result<Role, HrmError> {
        let employee = self
            .directory
            .get_employee(employee_id)
            .await
            .map_err(|e| HrmError::upstream(format!("role lookup for {employee_id}: {e}")))?
            .ok_or_else(|| HrmError::permission(format!("unknown principal {employee_id}")))?;

        if !employee.is_active() {
            return Err(HrmError::permission(format!(
                "principal {employee_id} is {}",
                employee.status
            )));
        }

        let role = employee.effective_role();
        debug!(employee_id, %role, "Resolved principal role");
        Ok(role)
    }
}

/// Principal id reserved for unattended jobs.
pub const SYSTEM_ACTOR: u64 = 0;

/// Grants [`Role::System`] to [`SYSTEM_ACTOR`] and defers every other
/// principal to `inner`.
pub struct SystemAuthorizer {
    inner: Arc<dyn Authorizer>,
}

impl SystemAuthorizer {
    pub fn new(inner: Arc<dyn Authorizer>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Authorizer for SystemAuthorizer {
    async fn role_of(&self, employee_id: u64) -> Result<Role, HrmError> {
        if employee_id == SYSTEM_ACTOR {
            return Ok(Role::System);
        }
        self.inner.role_of(employee_id).await
    }
}
