use std::{collections::BTreeMap, sync::Arc};

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::authorizer::Authorizer,
    config::AttendancePolicy,
    db::{DocumentStore, Filter},
    directory::{EmployeeDirectory, require_active_employee},
    error::{HrmError, StoreError},
    model::{
        attendance::{Attendance, AttendanceStatus},
        role::Capability,
    },
    utils::{
        calendar::{hours_between, is_working_day, round_dp, working_days},
        clock::Clock,
    },
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckIn {
    #[serde(default)]
    pub is_remote: bool,
    pub notes: Option<String>,
}

/// Manual entry by HR for a day without a check-in (absence, holiday...).
#[derive(Debug, Clone, Deserialize)]
pub struct MarkAttendance {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub is_remote: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub total_days: u32,
    /// Present and late days.
    pub present_days: u32,
    pub absent_days: u32,
    pub late_days: u32,
    pub half_days: u32,
    pub holidays: u32,
    pub remote_days: u32,
    pub total_hours: Decimal,
    pub average_hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeAttendance {
    pub employee_id: u64,
    pub summary: AttendanceSummary,
    /// Percentage of working days attended, 2 decimals.
    pub attendance_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub working_days: u32,
    pub employees: Vec<EmployeeAttendance>,
    pub average_attendance: Decimal,
}

/// Status for a check-in at `at`: anything after the work start is late.
pub fn classify_check_in(at: NaiveTime, work_start: NaiveTime) -> AttendanceStatus {
    if at > work_start {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

pub fn summarize(records: &[Attendance]) -> AttendanceSummary {
    let mut summary = AttendanceSummary {
        total_days: records.len() as u32,
        ..Default::default()
    };

    for record in records {
        match record.status {
            AttendanceStatus::Present => {}
            AttendanceStatus::Late => summary.late_days += 1,
            AttendanceStatus::Absent => summary.absent_days += 1,
            AttendanceStatus::HalfDay => summary.half_days += 1,
            AttendanceStatus::Holiday => summary.holidays += 1,
        }
        if record.status.counts_as_present() {
            summary.present_days += 1;
        }
        if record.is_remote {
            summary.remote_days += 1;
        }
        summary.total_hours = summary.total_hours.saturating_add(record.hours_worked);
    }

    if summary.total_days > 0 {
        summary.average_hours = round_dp(summary.total_hours / Decimal::from(summary.total_days), 2);
    }
    summary
}

/// `present_days / working_days × 100`, or 0 when there are no working days.
pub fn attendance_rate(present_days: u32, working_days: u32) -> Decimal {
    if working_days == 0 {
        return Decimal::ZERO;
    }
    round_dp(
        Decimal::from(present_days) * Decimal::ONE_HUNDRED / Decimal::from(working_days),
        2,
    )
}

/// Per-employee rates over `[start, end]` and their mean.
pub fn build_report(records: &[Attendance], start: NaiveDate, end: NaiveDate) -> AttendanceReport {
    let days = working_days(start, end);

    let mut by_employee: BTreeMap<u64, Vec<Attendance>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.date >= start && r.date <= end) {
        by_employee
            .entry(record.employee_id)
            .or_default()
            .push(record.clone());
    }

    let employees: Vec<EmployeeAttendance> = by_employee
        .into_iter()
        .map(|(employee_id, records)| {
            let summary = summarize(&records);
            // rate counts Mon–Fri attendance only, matching the denominator
            let attended = records
                .iter()
                .filter(|r| r.status.counts_as_present() && is_working_day(r.date))
                .count() as u32;
            EmployeeAttendance {
                employee_id,
                attendance_rate: attendance_rate(attended, days),
                summary,
            }
        })
        .collect();

    let average_attendance = if employees.is_empty() {
        Decimal::ZERO
    } else {
        let sum: Decimal = employees.iter().map(|e| e.attendance_rate).sum();
        round_dp(sum / Decimal::from(employees.len() as u64), 2)
    };

    AttendanceReport {
        start_date: start,
        end_date: end,
        working_days: days,
        employees,
        average_attendance,
    }
}

fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), HrmError> {
    if start > end {
        return Err(HrmError::validation("start_date cannot be after end_date"));
    }
    Ok(())
}

pub struct AttendanceService {
    store: Arc<dyn DocumentStore<Attendance>>,
    directory: Arc<dyn EmployeeDirectory>,
    auth: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    policy: AttendancePolicy,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn DocumentStore<Attendance>>,
        directory: Arc<dyn EmployeeDirectory>,
        auth: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        policy: AttendancePolicy,
    ) -> Self {
        Self {
            store,
            directory,
            auth,
            clock,
            policy,
        }
    }

    async fn record_for(&self, employee_id: u64, date: NaiveDate) -> Result<Option<Attendance>, HrmError> {
        let filter = Filter::new().eq("employee_id", employee_id).eq("date", date);
        Ok(self.store.find(&filter).await?.into_iter().next())
    }

    /// Opens today's record for `employee_id`.
    #[instrument(name = "check_in", skip(self, payload))]
    pub async fn check_in(&self, employee_id: u64, payload: CheckIn) -> Result<Attendance, HrmError> {
        require_active_employee(self.directory.as_ref(), employee_id).await?;

        let now = self.clock.now();
        let today = now.date();
        if self.record_for(employee_id, today).await?.is_some() {
            return Err(HrmError::conflict("Already checked in today"));
        }

        let status = classify_check_in(now.time(), self.policy.work_start);
        let record = Attendance {
            id: 0,
            employee_id,
            date: today,
            check_in: Some(now),
            check_out: None,
            status,
            is_remote: payload.is_remote,
            hours_worked: Decimal::ZERO,
            notes: payload.notes,
        };

        let created = match self.store.create(record).await {
            Ok(created) => created,
            // lost a race with a concurrent check-in for the same day
            Err(StoreError::UniqueViolation { .. }) => {
                return Err(HrmError::conflict("Already checked in today"));
            }
            Err(e) => return Err(e.into()),
        };

        info!(attendance_id = created.id, %status, "Checked in");
        Ok(created)
    }

    /// Closes today's record and stores the hours worked.
    #[instrument(name = "check_out", skip(self))]
    pub async fn check_out(&self, employee_id: u64) -> Result<Attendance, HrmError> {
        let now = self.clock.now();
        let mut record = self
            .record_for(employee_id, now.date())
            .await?
            .ok_or_else(|| HrmError::not_found("No check-in found for today"))?;

        let check_in = record
            .check_in
            .ok_or_else(|| HrmError::validation("today's record has no check-in"))?;
        if record.check_out.is_some() {
            return Err(HrmError::conflict("Already checked out today"));
        }
        if now < check_in {
            return Err(HrmError::validation("check-out cannot precede check-in"));
        }

        record.check_out = Some(now);
        record.hours_worked = hours_between(check_in, now);
        debug!(hours = %record.hours_worked, "Computed hours worked");

        let guard = Filter::new().eq("checked_out", false);
        let saved = self
            .store
            .update_where(record, &guard)
            .await?
            .ok_or_else(|| HrmError::conflict("Already checked out today"))?;

        info!(attendance_id = saved.id, hours = %saved.hours_worked, "Checked out");
        Ok(saved)
    }

    pub async fn today(&self, employee_id: u64) -> Result<Option<Attendance>, HrmError> {
        self.record_for(employee_id, self.clock.today()).await
    }

    #[instrument(name = "mark_attendance", skip(self, payload), fields(employee_id = payload.employee_id, date = %payload.date))]
    pub async fn mark_attendance(&self, actor_id: u64, payload: MarkAttendance) -> Result<Attendance, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require(Capability::RecordAttendance)?;

        self.directory
            .get_employee(payload.employee_id)
            .await?
            .ok_or_else(|| HrmError::not_found(format!("employee {}", payload.employee_id)))?;

        let record = Attendance {
            id: 0,
            employee_id: payload.employee_id,
            date: payload.date,
            check_in: None,
            check_out: None,
            status: payload.status,
            is_remote: payload.is_remote,
            hours_worked: Decimal::ZERO,
            notes: payload.notes,
        };

        match self.store.create(record).await {
            Ok(created) => {
                info!(attendance_id = created.id, status = %created.status, "Attendance recorded");
                Ok(created)
            }
            Err(StoreError::UniqueViolation { .. }) => {
                warn!("Attendance already recorded for this day");
                Err(HrmError::conflict(format!(
                    "attendance already recorded for employee {} on {}",
                    payload.employee_id, payload.date
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Records of one employee within `[start, end]`, oldest first.
    pub async fn attendance_history(
        &self,
        actor_id: u64,
        employee_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Attendance>, HrmError> {
        validate_range(start, end)?;
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require_owner_or(employee_id, Capability::ViewAttendanceReports)?;

        let filter = Filter::new().eq("employee_id", employee_id);
        let mut records: Vec<Attendance> = self
            .store
            .find(&filter)
            .await?
            .into_iter()
            .filter(|r| r.date >= start && r.date <= end)
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    pub async fn attendance_summary(
        &self,
        actor_id: u64,
        employee_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AttendanceSummary, HrmError> {
        let records = self.attendance_history(actor_id, employee_id, start, end).await?;
        Ok(summarize(&records))
    }

    #[instrument(name = "attendance_report", skip(self))]
    pub async fn attendance_report(
        &self,
        actor_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AttendanceReport, HrmError> {
        validate_range(start, end)?;
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require(Capability::ViewAttendanceReports)?;

        let records = self.store.find(&Filter::new()).await?;
        let report = build_report(&records, start, end);
        info!(
            employees = report.employees.len(),
            average = %report.average_attendance,
            "Attendance report built"
        );
        Ok(report)
    }
}
