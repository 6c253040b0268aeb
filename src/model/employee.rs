use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::model::role::Role;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmploymentStatus {
    Active,
    Inactive,
    Terminated,
}

/// Directory entry for an employee, as returned by the employee directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: u64,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position: String,
    /// Explicit role; when absent the role is inferred from `position`.
    #[serde(default)]
    pub role: Option<Role>,
    /// Annual salary.
    pub salary: Decimal,
    pub status: EmploymentStatus,
    pub hire_date: NaiveDate,
}

impl Employee {
    pub fn effective_role(&self) -> Role {
        self.role
            .unwrap_or_else(|| Role::from_position(&self.position))
    }

    pub fn is_active(&self) -> bool {
        self.status == EmploymentStatus::Active
    }
}
