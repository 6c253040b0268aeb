use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Something a principal may be allowed to do beyond self-service.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    ReviewLeave,
    ViewAllLeave,
    RecordAttendance,
    ViewAttendanceReports,
    ManagePayroll,
    ViewAllPayroll,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Hr,
    Employee,
    /// Unattended jobs such as scheduled payroll runs.
    System,
}

const HR_CAPABILITIES: &[Capability] = &[
    Capability::ReviewLeave,
    Capability::ViewAllLeave,
    Capability::RecordAttendance,
    Capability::ViewAttendanceReports,
    Capability::ManagePayroll,
    Capability::ViewAllPayroll,
];

const SYSTEM_CAPABILITIES: &[Capability] = &[
    Capability::ViewAllLeave,
    Capability::ViewAttendanceReports,
    Capability::ManagePayroll,
    Capability::ViewAllPayroll,
];

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Admin | Role::Hr => HR_CAPABILITIES,
            Role::System => SYSTEM_CAPABILITIES,
            Role::Employee => &[],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn is_hr_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }

    /// Role implied by a free-text job position, for directory entries that
    /// carry no explicit role. The position is trimmed and lowercased first;
    /// then "admin" is Admin and anything containing "hr" is HR, so
    /// " Admin " is Admin while "HR Intern" and "Chrome Engineer" both map to HR.
    pub fn from_position(position: &str) -> Role {
        let position = position.trim().to_lowercase();
        if position == "admin" {
            Role::Admin
        } else if position.contains("hr") {
            Role::Hr
        } else {
            Role::Employee
        }
    }
}
