use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
    config::LeavePolicy,
    db::{Document, FieldValue},
    utils::calendar::days_inclusive,
};

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Maternity,
    Paternity,
    Personal,
    Emergency,
}

impl LeaveType {
    /// Yearly allowance in days; `None` for types that are not budgeted.
    pub fn allocation(self, policy: &LeavePolicy) -> Option<u32> {
        match self {
            LeaveType::Annual => Some(policy.annual_days),
            LeaveType::Sick => Some(policy.sick_days),
            LeaveType::Personal => Some(policy.personal_days),
            LeaveType::Maternity | LeaveType::Paternity | LeaveType::Emergency => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    /// Pending and approved requests hold their dates.
    pub fn is_active(self) -> bool {
        matches!(self, LeaveStatus::Pending | LeaveStatus::Approved)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    #[serde(default)]
    pub id: u64,
    pub employee_id: u64,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub status: LeaveStatus,
    #[serde(default)]
    pub approver_id: Option<u64>,
    #[serde(default)]
    pub review_comments: Option<String>,
    pub days_requested: u32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl LeaveRequest {
    pub fn days_between(start: NaiveDate, end: NaiveDate) -> u32 {
        days_inclusive(start, end) as u32
    }

    /// True if `[start, end]` shares at least one day with this request.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date >= start
    }
}

impl Document for LeaveRequest {
    const COLLECTION: &'static str = "leave_requests";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "employee_id" => Some(self.employee_id.into()),
            "leave_type" => Some(self.leave_type.as_ref().into()),
            "status" => Some(self.status.as_ref().into()),
            "approver_id" => self.approver_id.map(FieldValue::from),
            _ => None,
        }
    }
}
