use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;

use crate::{error::HrmError, model::employee::Employee};

/// Lookup of employee records owned by another system.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// `Ok(None)` when no such employee exists; `Err` only when the lookup
    /// itself failed.
    async fn get_employee(&self, id: u64) -> Result<Option<Employee>, HrmError>;
}

/// Directory held in memory, typically loaded from a seed file.
#[derive(Default)]
pub struct StaticDirectory {
    employees: RwLock<HashMap<u64, Employee>>,
}

impl StaticDirectory {
    pub fn new(employees: impl IntoIterator<Item = Employee>) -> Self {
        Self {
            employees: RwLock::new(employees.into_iter().map(|e| (e.id, e)).collect()),
        }
    }

    pub fn upsert(&self, employee: Employee) {
        if let Ok(mut employees) = self.employees.write() {
            employees.insert(employee.id, employee);
        }
    }

    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .employees
            .read()
            .map(|employees| employees.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl EmployeeDirectory for StaticDirectory {
    async fn get_employee(&self, id: u64) -> Result<Option<Employee>, HrmError> {
        let employees = self
            .employees
            .read()
            .map_err(|_| HrmError::upstream("employee directory lock poisoned"))?;
        Ok(employees.get(&id).cloned())
    }
}

/// Fetches an employee that must exist and be active.
pub async fn require_active_employee(
    directory: &dyn EmployeeDirectory,
    employee_id: u64,
) -> Result<Employee, HrmError> {
    let employee = directory
        .get_employee(employee_id)
        .await?
        .ok_or_else(|| HrmError::not_found(format!("employee {employee_id}")))?;

    if !employee.is_active() {
        return Err(HrmError::validation(format!(
            "employee {employee_id} is {}",
            employee.status
        )));
    }
    Ok(employee)
}
