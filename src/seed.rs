use serde::Deserialize;
use tracing::{error, info};

use crate::{
    context::Stores,
    directory::StaticDirectory,
    error::HrmError,
    model::{attendance::Attendance, employee::Employee, leave_request::LeaveRequest},
};

/// Snapshot of employees and their records, as exported by the HR system.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub attendance: Vec<Attendance>,
    #[serde(default)]
    pub leave_requests: Vec<LeaveRequest>,
}

impl Seed {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn directory(&self) -> StaticDirectory {
        StaticDirectory::new(self.employees.iter().cloned())
    }

    /// Inserts the records; ids in the snapshot are reassigned.
    pub async fn load_into(&self, stores: &Stores) -> Result<(), HrmError> {
        for record in &self.attendance {
            if let Err(e) = stores.attendance.create(record.clone()).await {
                error!(error = %e, employee_id = record.employee_id, date = %record.date, "Failed to load attendance");
                return Err(e.into());
            }
        }
        for request in &self.leave_requests {
            if let Err(e) = stores.leave.create(request.clone()).await {
                error!(error = %e, employee_id = request.employee_id, "Failed to load leave request");
                return Err(e.into());
            }
        }
        info!(
            employees = self.employees.len(),
            attendance = self.attendance.len(),
            leave_requests = self.leave_requests.len(),
            "Seed loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Filter;

    const SEED: &str = r#"{
        "employees": [{
            "id": 7, "employee_code": "EMP0007", "first_name": "Dana", "last_name": "Reyes",
            "email": "dana@example.com", "position": "Analyst", "salary": "52000",
            "status": "active", "hire_date": "2023-05-01"
        }],
        "attendance": [
            {"employee_id": 7, "date": "2026-03-02", "status": "present", "hours_worked": "8"},
            {"employee_id": 7, "date": "2026-03-02", "status": "late"}
        ]
    }"#;

    #[tokio::test]
    async fn duplicate_attendance_in_snapshot_is_a_conflict() {
        let seed = Seed::from_json(SEED).unwrap();
        assert_eq!(seed.directory().ids(), vec![7]);

        let stores = Stores::in_memory();
        let err = seed.load_into(&stores).await.unwrap_err();
        assert!(matches!(err, HrmError::Conflict(_)));
        assert_eq!(stores.attendance.find(&Filter::new()).await.unwrap().len(), 1);
    }
}
