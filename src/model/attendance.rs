use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::db::{Document, FieldValue};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    HalfDay,
    Holiday,
}

impl AttendanceStatus {
    /// Late arrivals still count as attended days.
    pub fn counts_as_present(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
    #[serde(default)]
    pub id: u64,
    pub employee_id: u64,
    pub date: NaiveDate,
    #[serde(default)]
    pub check_in: Option<NaiveDateTime>,
    #[serde(default)]
    pub check_out: Option<NaiveDateTime>,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub hours_worked: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Attendance {
    pub fn key(employee_id: u64, date: NaiveDate) -> String {
        format!("{employee_id}:{date}")
    }
}

impl Document for Attendance {
    const COLLECTION: &'static str = "attendance";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn unique_key(&self) -> Option<String> {
        Some(Attendance::key(self.employee_id, self.date))
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "employee_id" => Some(self.employee_id.into()),
            "date" => Some(self.date.into()),
            "status" => Some(self.status.as_ref().into()),
            "is_remote" => Some(self.is_remote.into()),
            "checked_out" => Some(self.check_out.is_some().into()),
            _ => None,
        }
    }
}
