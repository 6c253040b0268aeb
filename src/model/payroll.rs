use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::db::{Document, FieldValue};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PayrollStatus {
    Draft,
    Processed,
    Paid,
}

impl PayrollStatus {
    /// The only status reachable from this one, if any.
    pub fn next(self) -> Option<PayrollStatus> {
        match self {
            PayrollStatus::Draft => Some(PayrollStatus::Processed),
            PayrollStatus::Processed => Some(PayrollStatus::Paid),
            PayrollStatus::Paid => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deductions {
    pub tax: Decimal,
    pub insurance: Decimal,
    pub retirement: Decimal,
    pub other: Decimal,
}

impl Deductions {
    /// `None` if the sum overflows.
    pub fn total(&self) -> Option<Decimal> {
        self.tax
            .checked_add(self.insurance)?
            .checked_add(self.retirement)?
            .checked_add(self.other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payroll {
    #[serde(default)]
    pub id: u64,
    pub employee_id: u64,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    /// Annual salary pro-rated to the period.
    pub base_salary: Decimal,
    pub overtime_hours: Decimal,
    pub overtime_rate: Decimal,
    pub bonuses: Decimal,
    pub deductions: Deductions,
    pub gross_pay: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
    pub status: PayrollStatus,
    #[serde(default)]
    pub processed_by: Option<u64>,
    #[serde(default)]
    pub processed_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub paid_at: Option<NaiveDateTime>,
}

impl Payroll {
    pub fn key(employee_id: u64, start: NaiveDate, end: NaiveDate) -> String {
        format!("{employee_id}:{start}:{end}")
    }
}

impl Document for Payroll {
    const COLLECTION: &'static str = "payroll";

    fn id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn unique_key(&self) -> Option<String> {
        Some(Payroll::key(
            self.employee_id,
            self.pay_period_start,
            self.pay_period_end,
        ))
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "employee_id" => Some(self.employee_id.into()),
            "pay_period_start" => Some(self.pay_period_start.into()),
            "pay_period_end" => Some(self.pay_period_end.into()),
            "status" => Some(self.status.as_ref().into()),
            _ => None,
        }
    }
}
