use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::authorizer::Authorizer,
    config::{AttendancePolicy, PayrollPolicy},
    db::{DocumentStore, Filter},
    directory::{EmployeeDirectory, require_active_employee},
    error::{HrmError, StoreError},
    model::{
        attendance::Attendance,
        payroll::{Deductions, Payroll, PayrollStatus},
        role::Capability,
    },
    utils::{
        calendar::{days_in_year, days_inclusive, money, working_days},
        clock::Clock,
        pagination::{Page, PageRequest},
    },
};

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratePayroll {
    pub employee_id: u64,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    #[serde(default)]
    pub bonuses: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePayroll {
    pub bonuses: Option<Decimal>,
    pub other_deduction: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayrollQuery {
    pub employee_id: Option<u64>,
    pub status: Option<PayrollStatus>,
    #[serde(flatten)]
    pub page: PageRequest,
}

/// Everything a pay slip shows, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayrollFigures {
    pub base_salary: Decimal,
    pub overtime_hours: Decimal,
    pub overtime_rate: Decimal,
    pub overtime_pay: Decimal,
    pub bonuses: Decimal,
    pub deductions: Deductions,
    pub gross_pay: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
}

/// Inputs of one pay computation.
#[derive(Debug, Clone)]
pub struct PayInputs {
    pub annual_salary: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub hours_worked: Decimal,
    pub bonuses: Decimal,
    pub other_deduction: Decimal,
}

fn out_of_range(what: &str) -> HrmError {
    HrmError::validation(format!("{what} is out of range"))
}

/// Annual salary pro-rated over the inclusive period, using the length of
/// the year the period starts in. `None` on overflow.
pub fn prorated_salary(annual_salary: Decimal, start: NaiveDate, end: NaiveDate) -> Option<Decimal> {
    let year_days = Decimal::from(days_in_year(start.year()));
    let period_days = Decimal::from(days_inclusive(start, end));
    annual_salary
        .checked_div(year_days)?
        .checked_mul(period_days)
        .map(money)
}

/// Hours beyond `working_days × daily_hours`, never negative.
pub fn overtime_hours(total_hours: Decimal, working_days: u32, daily_hours: Decimal) -> Option<Decimal> {
    let allotment = Decimal::from(working_days).checked_mul(daily_hours)?;
    let regular = total_hours.min(allotment);
    Some(total_hours.checked_sub(regular)?.max(Decimal::ZERO))
}

/// `None` when the policy has no standard hours or the rate overflows.
pub fn overtime_rate(annual_salary: Decimal, policy: &PayrollPolicy) -> Option<Decimal> {
    annual_salary
        .checked_div(policy.standard_annual_hours)?
        .checked_mul(policy.overtime_multiplier)
        .map(money)
}

fn statutory_deductions(taxable: Decimal, other: Decimal, policy: &PayrollPolicy) -> Option<Deductions> {
    Some(Deductions {
        tax: money(taxable.checked_mul(policy.tax_rate)?),
        insurance: money(taxable.checked_mul(policy.insurance_rate)?),
        retirement: money(taxable.checked_mul(policy.retirement_rate)?),
        other: money(other),
    })
}

/// Computes a pay slip. Every component is rounded to cents before it is
/// summed, so `gross = base + overtime + bonuses` and
/// `net = gross − total_deductions` hold exactly. Amounts too large to
/// represent are a validation error.
pub fn compute_payroll(
    inputs: &PayInputs,
    payroll_policy: &PayrollPolicy,
    attendance_policy: &AttendancePolicy,
) -> Result<PayrollFigures, HrmError> {
    let base_salary = prorated_salary(inputs.annual_salary, inputs.period_start, inputs.period_end)
        .ok_or_else(|| out_of_range("base salary"))?;
    let days = working_days(inputs.period_start, inputs.period_end);
    let overtime_hours = overtime_hours(
        inputs.hours_worked,
        days,
        attendance_policy.standard_daily_hours,
    )
    .ok_or_else(|| out_of_range("overtime hours"))?;
    let overtime_rate = overtime_rate(inputs.annual_salary, payroll_policy)
        .ok_or_else(|| out_of_range("overtime rate"))?;
    let overtime_pay = overtime_hours
        .checked_mul(overtime_rate)
        .map(money)
        .ok_or_else(|| out_of_range("overtime pay"))?;
    let bonuses = money(inputs.bonuses);

    let taxable = base_salary
        .checked_add(overtime_pay)
        .ok_or_else(|| out_of_range("taxable pay"))?;
    let deductions = statutory_deductions(taxable, inputs.other_deduction, payroll_policy)
        .ok_or_else(|| out_of_range("deductions"))?;
    let (gross_pay, total_deductions, net_pay) = totals(taxable, bonuses, &deductions)?;

    Ok(PayrollFigures {
        base_salary,
        overtime_hours,
        overtime_rate,
        overtime_pay,
        bonuses,
        gross_pay,
        total_deductions,
        net_pay,
        deductions,
    })
}

/// Gross, total deductions and net from base-plus-overtime and bonuses.
fn totals(
    taxable: Decimal,
    bonuses: Decimal,
    deductions: &Deductions,
) -> Result<(Decimal, Decimal, Decimal), HrmError> {
    let gross = taxable
        .checked_add(bonuses)
        .ok_or_else(|| out_of_range("gross pay"))?;
    let total = deductions
        .total()
        .ok_or_else(|| out_of_range("total deductions"))?;
    let net = gross
        .checked_sub(total)
        .ok_or_else(|| out_of_range("net pay"))?;
    Ok((gross, total, net))
}

/// Re-derives the totals of a stored payroll after bonuses or the other
/// deduction changed. Statutory deductions depend only on base and overtime.
fn recompute_totals(payroll: &mut Payroll) -> Result<(), HrmError> {
    let taxable = payroll
        .overtime_hours
        .checked_mul(payroll.overtime_rate)
        .map(money)
        .and_then(|overtime_pay| payroll.base_salary.checked_add(overtime_pay))
        .ok_or_else(|| out_of_range("taxable pay"))?;
    let (gross, total, net) = totals(taxable, payroll.bonuses, &payroll.deductions)?;
    payroll.gross_pay = gross;
    payroll.total_deductions = total;
    payroll.net_pay = net;
    Ok(())
}

/// Outcome of generating payroll for several employees at once.
#[derive(Debug, Clone, Serialize)]
pub struct PayrollRun {
    pub generated: Vec<Payroll>,
    pub failed: Vec<PayrollFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayrollFailure {
    pub employee_id: u64,
    pub error: HrmError,
}

pub struct PayrollService {
    store: Arc<dyn DocumentStore<Payroll>>,
    attendance: Arc<dyn DocumentStore<Attendance>>,
    directory: Arc<dyn EmployeeDirectory>,
    auth: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    policy: PayrollPolicy,
    attendance_policy: AttendancePolicy,
}

impl PayrollService {
    pub fn new(
        store: Arc<dyn DocumentStore<Payroll>>,
        attendance: Arc<dyn DocumentStore<Attendance>>,
        directory: Arc<dyn EmployeeDirectory>,
        auth: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        policy: PayrollPolicy,
        attendance_policy: AttendancePolicy,
    ) -> Self {
        Self {
            store,
            attendance,
            directory,
            auth,
            clock,
            policy,
            attendance_policy,
        }
    }

    async fn fetch(&self, payroll_id: u64) -> Result<Payroll, HrmError> {
        self.store
            .find_by_id(payroll_id)
            .await?
            .ok_or_else(|| HrmError::not_found(format!("payroll {payroll_id}")))
    }

    async fn hours_in_period(
        &self,
        employee_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, HrmError> {
        let filter = Filter::new().eq("employee_id", employee_id);
        self.attendance
            .find(&filter)
            .await?
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .try_fold(Decimal::ZERO, |total, r| total.checked_add(r.hours_worked))
            .ok_or_else(|| out_of_range("hours worked"))
    }

    /// Creates a draft payroll for one employee and period.
    #[instrument(
        name = "generate_payroll",
        skip(self, request),
        fields(employee_id = request.employee_id, start = %request.pay_period_start, end = %request.pay_period_end)
    )]
    pub async fn generate_payroll(&self, actor_id: u64, request: GeneratePayroll) -> Result<Payroll, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require(Capability::ManagePayroll)?;

        let GeneratePayroll {
            employee_id,
            pay_period_start: start,
            pay_period_end: end,
            bonuses,
        } = request;

        if start > end {
            return Err(HrmError::validation("pay_period_start cannot be after pay_period_end"));
        }
        if bonuses < Decimal::ZERO {
            return Err(HrmError::validation("bonuses cannot be negative"));
        }

        let employee = require_active_employee(self.directory.as_ref(), employee_id).await?;
        if employee.salary <= Decimal::ZERO {
            return Err(HrmError::validation(format!(
                "employee {employee_id} has no positive salary"
            )));
        }

        let period = Filter::new()
            .eq("employee_id", employee_id)
            .eq("pay_period_start", start)
            .eq("pay_period_end", end);
        if !self.store.find(&period).await?.is_empty() {
            return Err(HrmError::conflict(format!(
                "payroll already exists for employee {employee_id} from {start} to {end}"
            )));
        }

        let hours_worked = self.hours_in_period(employee_id, start, end).await?;
        let figures = compute_payroll(
            &PayInputs {
                annual_salary: employee.salary,
                period_start: start,
                period_end: end,
                hours_worked,
                bonuses,
                other_deduction: Decimal::ZERO,
            },
            &self.policy,
            &self.attendance_policy,
        )?;
        debug!(?figures, %hours_worked, "Computed payroll figures");

        let draft = Payroll {
            id: 0,
            employee_id,
            pay_period_start: start,
            pay_period_end: end,
            base_salary: figures.base_salary,
            overtime_hours: figures.overtime_hours,
            overtime_rate: figures.overtime_rate,
            bonuses: figures.bonuses,
            deductions: figures.deductions,
            gross_pay: figures.gross_pay,
            total_deductions: figures.total_deductions,
            net_pay: figures.net_pay,
            status: PayrollStatus::Draft,
            processed_by: None,
            processed_at: None,
            paid_at: None,
        };

        let created = match self.store.create(draft).await {
            Ok(created) => created,
            Err(StoreError::UniqueViolation { .. }) => {
                return Err(HrmError::conflict(format!(
                    "payroll already exists for employee {employee_id} from {start} to {end}"
                )));
            }
            Err(e) => {
                error!(error = %e, employee_id, "Failed to store payroll");
                return Err(e.into());
            }
        };

        info!(payroll_id = created.id, net_pay = %created.net_pay, "Payroll generated");
        Ok(created)
    }

    /// Generates payroll for every listed employee concurrently; failures are
    /// reported per employee instead of aborting the run.
    #[instrument(name = "generate_payroll_batch", skip(self, employee_ids), fields(count = employee_ids.len()))]
    pub async fn generate_payroll_batch(
        &self,
        actor_id: u64,
        employee_ids: &[u64],
        start: NaiveDate,
        end: NaiveDate,
        bonuses: Decimal,
    ) -> Result<PayrollRun, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require(Capability::ManagePayroll)?;

        let jobs = employee_ids.iter().map(|&employee_id| async move {
            let result = self
                .generate_payroll(
                    actor_id,
                    GeneratePayroll {
                        employee_id,
                        pay_period_start: start,
                        pay_period_end: end,
                        bonuses,
                    },
                )
                .await;
            (employee_id, result)
        });

        let mut run = PayrollRun {
            generated: Vec::new(),
            failed: Vec::new(),
        };
        for (employee_id, result) in join_all(jobs).await {
            match result {
                Ok(payroll) => run.generated.push(payroll),
                Err(error) => {
                    warn!(employee_id, %error, "Payroll generation failed");
                    run.failed.push(PayrollFailure { employee_id, error });
                }
            }
        }

        info!(
            generated = run.generated.len(),
            failed = run.failed.len(),
            "Payroll run finished"
        );
        Ok(run)
    }

    pub async fn get_payroll(&self, actor_id: u64, payroll_id: u64) -> Result<Payroll, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        let payroll = self.fetch(payroll_id).await?;
        actor.require_owner_or(payroll.employee_id, Capability::ViewAllPayroll)?;
        Ok(payroll)
    }

    /// Newest periods first. Employees without payroll access only see their own.
    pub async fn list_payrolls(&self, actor_id: u64, mut query: PayrollQuery) -> Result<Page<Payroll>, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        if !actor.role.can(Capability::ViewAllPayroll) {
            match query.employee_id {
                Some(id) if id != actor_id => {
                    return Err(HrmError::permission("cannot list other employees' payroll"));
                }
                _ => query.employee_id = Some(actor_id),
            }
        }

        let filter = Filter::new()
            .eq_opt("employee_id", query.employee_id)
            .eq_opt("status", query.status.map(|s| s.as_ref().to_string()));

        let mut payrolls = self.store.find(&filter).await?;
        payrolls.sort_by(|a, b| {
            b.pay_period_start
                .cmp(&a.pay_period_start)
                .then(a.employee_id.cmp(&b.employee_id))
        });
        Ok(query.page.paginate(payrolls))
    }

    /// Adjusts bonuses or the other deduction of an unpaid payroll.
    #[instrument(name = "update_payroll", skip(self, changes))]
    pub async fn update_payroll(
        &self,
        actor_id: u64,
        payroll_id: u64,
        changes: UpdatePayroll,
    ) -> Result<Payroll, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require(Capability::ManagePayroll)?;

        let mut payroll = self.fetch(payroll_id).await?;
        if payroll.status == PayrollStatus::Paid {
            return Err(HrmError::conflict("paid payroll records are immutable"));
        }

        if let Some(bonuses) = changes.bonuses {
            if bonuses < Decimal::ZERO {
                return Err(HrmError::validation("bonuses cannot be negative"));
            }
            payroll.bonuses = money(bonuses);
        }
        if let Some(other) = changes.other_deduction {
            if other < Decimal::ZERO {
                return Err(HrmError::validation("other deduction cannot be negative"));
            }
            payroll.deductions.other = money(other);
        }
        recompute_totals(&mut payroll)?;

        let guard = Filter::new().eq("status", payroll.status.as_ref());
        let saved = self
            .store
            .update_where(payroll, &guard)
            .await?
            .ok_or_else(|| HrmError::conflict("payroll changed status concurrently"))?;

        info!(payroll_id, net_pay = %saved.net_pay, "Payroll updated");
        Ok(saved)
    }

    async fn transition(&self, actor_id: u64, payroll_id: u64, target: PayrollStatus) -> Result<Payroll, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require(Capability::ManagePayroll)?;

        let mut payroll = self.fetch(payroll_id).await?;
        let current = payroll.status;
        if current.next() != Some(target) {
            warn!(payroll_id, %current, %target, "Payroll transition refused");
            return Err(HrmError::conflict(format!(
                "payroll cannot move from {current} to {target}"
            )));
        }

        let now = self.clock.now();
        payroll.status = target;
        match target {
            PayrollStatus::Processed => {
                payroll.processed_by = Some(actor_id);
                payroll.processed_at = Some(now);
            }
            PayrollStatus::Paid => payroll.paid_at = Some(now),
            PayrollStatus::Draft => {}
        }

        let guard = Filter::new().eq("status", current.as_ref());
        let saved = self
            .store
            .update_where(payroll, &guard)
            .await?
            .ok_or_else(|| HrmError::conflict("payroll changed status concurrently"))?;

        info!(payroll_id, from = %current, to = %target, "Payroll status changed");
        Ok(saved)
    }

    #[instrument(name = "process_payroll", skip(self))]
    pub async fn process_payroll(&self, actor_id: u64, payroll_id: u64) -> Result<Payroll, HrmError> {
        self.transition(actor_id, payroll_id, PayrollStatus::Processed)
            .await
    }

    #[instrument(name = "mark_payroll_paid", skip(self))]
    pub async fn mark_payroll_paid(&self, actor_id: u64, payroll_id: u64) -> Result<Payroll, HrmError> {
        self.transition(actor_id, payroll_id, PayrollStatus::Paid).await
    }

    /// Removes a draft; processed and paid records stay.
    #[instrument(name = "delete_payroll", skip(self))]
    pub async fn delete_payroll(&self, actor_id: u64, payroll_id: u64) -> Result<(), HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require(Capability::ManagePayroll)?;

        let payroll = self.fetch(payroll_id).await?;
        if payroll.status != PayrollStatus::Draft {
            return Err(HrmError::conflict(format!(
                "only draft payroll can be deleted, this one is {}",
                payroll.status
            )));
        }
        let guard = Filter::new().eq("status", PayrollStatus::Draft.as_ref());
        if !self.store.delete_where(payroll_id, &guard).await? {
            return Err(HrmError::conflict("payroll changed status concurrently"));
        }
        info!(payroll_id, "Payroll deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::attendance::CheckIn,
        context::Stores,
        db::MemoryStore,
        test_support::{Fault, FaultyStore, Fixture, at, date},
    };
    use rust_decimal_macros::dec;

    fn inputs(salary: Decimal, start: NaiveDate, end: NaiveDate, hours: Decimal) -> PayInputs {
        PayInputs {
            annual_salary: salary,
            period_start: start,
            period_end: end,
            hours_worked: hours,
            bonuses: Decimal::ZERO,
            other_deduction: Decimal::ZERO,
        }
    }

    #[test]
    fn fifteen_day_period_prorates_annual_salary() {
        let base = prorated_salary(dec!(75000), date(2026, 3, 1), date(2026, 3, 15));
        assert_eq!(base, Some(dec!(3082.19)));
    }

    #[test]
    fn leap_year_uses_366_days() {
        let base = prorated_salary(dec!(73200), date(2024, 2, 1), date(2024, 2, 10));
        assert_eq!(base, Some(dec!(2000.00)));
    }

    #[test]
    fn overtime_only_counts_hours_beyond_regular_allotment() {
        assert_eq!(overtime_hours(dec!(45.5), 5, dec!(8)), Some(dec!(5.5)));
        assert_eq!(overtime_hours(dec!(30), 5, dec!(8)), Some(Decimal::ZERO));
        assert_eq!(overtime_hours(dec!(4), 0, dec!(8)), Some(dec!(4)));
    }

    #[test]
    fn overtime_rate_is_time_and_a_half_of_hourly() {
        let policy = PayrollPolicy::default();
        assert_eq!(overtime_rate(dec!(104000), &policy), Some(dec!(75.00)));
        assert_eq!(overtime_rate(dec!(75000), &policy), Some(dec!(54.09)));
    }

    #[test]
    fn totals_are_consistent_with_components() {
        let mut pay = inputs(dec!(75000), date(2026, 3, 2), date(2026, 3, 13), dec!(86.25));
        pay.bonuses = dec!(250);
        let figures =
            compute_payroll(&pay, &PayrollPolicy::default(), &AttendancePolicy::default()).unwrap();

        // 10 working days, 80 regular hours
        assert_eq!(figures.overtime_hours, dec!(6.25));
        assert_eq!(figures.overtime_pay, money(dec!(6.25) * dec!(54.09)));
        assert_eq!(
            figures.gross_pay,
            figures.base_salary + figures.overtime_pay + figures.bonuses
        );
        assert_eq!(figures.net_pay, figures.gross_pay - figures.deductions.total().unwrap());

        let taxable = figures.base_salary + figures.overtime_pay;
        assert_eq!(figures.deductions.tax, money(taxable * dec!(0.22)));
        assert_eq!(figures.deductions.insurance, money(taxable * dec!(0.05)));
        assert_eq!(figures.deductions.retirement, money(taxable * dec!(0.06)));
        assert_eq!(figures.deductions.other, Decimal::ZERO);
    }

    #[test]
    fn missing_standard_hours_gives_no_overtime_rate() {
        let policy = PayrollPolicy {
            standard_annual_hours: Decimal::ZERO,
            ..PayrollPolicy::default()
        };
        assert_eq!(overtime_rate(dec!(75000), &policy), None);

        let pay = inputs(dec!(75000), date(2026, 3, 2), date(2026, 3, 6), dec!(40));
        let err = compute_payroll(&pay, &policy, &AttendancePolicy::default()).unwrap_err();
        assert!(matches!(err, HrmError::Validation(_)));
    }

    #[tokio::test]
    async fn generated_payroll_uses_attendance_hours() {
        let fx = Fixture::new();
        for day in 2..=6 {
            fx.clock.set(at(2026, 3, day, 8, 0));
            fx.ctx.attendance.check_in(fx.alice, CheckIn::default()).await.unwrap();
            fx.clock.set(at(2026, 3, day, 18, 0));
            fx.ctx.attendance.check_out(fx.alice).await.unwrap();
        }

        let payroll = fx
            .ctx
            .payroll
            .generate_payroll(
                fx.hr,
                GeneratePayroll {
                    employee_id: fx.alice,
                    pay_period_start: date(2026, 3, 2),
                    pay_period_end: date(2026, 3, 6),
                    bonuses: dec!(100),
                },
            )
            .await
            .unwrap();

        assert_eq!(payroll.status, PayrollStatus::Draft);
        assert_eq!(payroll.overtime_hours, dec!(10));
        assert_eq!(payroll.gross_pay, payroll.base_salary + dec!(10) * payroll.overtime_rate + dec!(100));
        assert_eq!(payroll.net_pay, payroll.gross_pay - payroll.total_deductions);
    }

    #[tokio::test]
    async fn duplicate_period_conflicts() {
        let fx = Fixture::new();
        let request = GeneratePayroll {
            employee_id: fx.alice,
            pay_period_start: date(2026, 3, 1),
            pay_period_end: date(2026, 3, 15),
            bonuses: Decimal::ZERO,
        };
        fx.ctx.payroll.generate_payroll(fx.hr, request.clone()).await.unwrap();
        let err = fx.ctx.payroll.generate_payroll(fx.hr, request).await.unwrap_err();
        assert!(matches!(err, HrmError::Conflict(_)));
    }

    #[tokio::test]
    async fn employees_cannot_generate_payroll() {
        let fx = Fixture::new();
        let err = fx
            .ctx
            .payroll
            .generate_payroll(
                fx.alice,
                GeneratePayroll {
                    employee_id: fx.alice,
                    pay_period_start: date(2026, 3, 1),
                    pay_period_end: date(2026, 3, 15),
                    bonuses: Decimal::ZERO,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HrmError::Permission(_)));
    }

    #[tokio::test]
    async fn admin_may_generate_but_not_for_inactive_or_unpaid_staff() {
        let fx = Fixture::new();
        let mut leaver = crate::test_support::employee(6, "Analyst", None, dec!(48000));
        leaver.status = crate::model::employee::EmploymentStatus::Inactive;
        fx.directory.upsert(leaver);
        fx.directory
            .upsert(crate::test_support::employee(7, "Volunteer", None, Decimal::ZERO));

        let request = |employee_id| GeneratePayroll {
            employee_id,
            pay_period_start: date(2026, 3, 1),
            pay_period_end: date(2026, 3, 31),
            bonuses: Decimal::ZERO,
        };
        let svc = &fx.ctx.payroll;
        assert!(svc.generate_payroll(fx.admin, request(fx.bob)).await.is_ok());

        let err = svc.generate_payroll(fx.admin, request(6)).await.unwrap_err();
        assert!(matches!(err, HrmError::Validation(_)));
        let err = svc.generate_payroll(fx.admin, request(7)).await.unwrap_err();
        assert!(matches!(err, HrmError::Validation(_)));

        let mut reversed = request(fx.alice);
        reversed.pay_period_end = date(2026, 2, 1);
        let err = svc.generate_payroll(fx.admin, reversed).await.unwrap_err();
        assert!(matches!(err, HrmError::Validation(_)));
    }

    #[tokio::test]
    async fn status_moves_forward_and_paid_is_frozen() {
        let fx = Fixture::new();
        let payroll = fx
            .ctx
            .payroll
            .generate_payroll(
                fx.hr,
                GeneratePayroll {
                    employee_id: fx.alice,
                    pay_period_start: date(2026, 3, 1),
                    pay_period_end: date(2026, 3, 15),
                    bonuses: Decimal::ZERO,
                },
            )
            .await
            .unwrap();
        let svc = &fx.ctx.payroll;

        let err = svc.mark_payroll_paid(fx.hr, payroll.id).await.unwrap_err();
        assert!(matches!(err, HrmError::Conflict(_)));

        let updated = svc
            .update_payroll(
                fx.hr,
                payroll.id,
                UpdatePayroll {
                    bonuses: Some(dec!(500)),
                    other_deduction: Some(dec!(20)),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.gross_pay, payroll.gross_pay + dec!(500));
        assert_eq!(updated.total_deductions, payroll.total_deductions + dec!(20));
        assert_eq!(updated.net_pay, updated.gross_pay - updated.total_deductions);

        let processed = svc.process_payroll(fx.hr, payroll.id).await.unwrap();
        assert_eq!(processed.status, PayrollStatus::Processed);
        assert_eq!(processed.processed_by, Some(fx.hr));

        let paid = svc.mark_payroll_paid(fx.hr, payroll.id).await.unwrap();
        assert_eq!(paid.status, PayrollStatus::Paid);
        assert!(paid.paid_at.is_some());

        let err = svc
            .update_payroll(fx.hr, payroll.id, UpdatePayroll::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HrmError::Conflict(_)));
        let err = svc.delete_payroll(fx.hr, payroll.id).await.unwrap_err();
        assert!(matches!(err, HrmError::Conflict(_)));
    }

    #[tokio::test]
    async fn batch_reports_failures_per_employee() {
        let fx = Fixture::new();
        let run = fx
            .ctx
            .payroll
            .generate_payroll_batch(
                fx.hr,
                &[fx.alice, fx.bob, 999],
                date(2026, 3, 1),
                date(2026, 3, 31),
                Decimal::ZERO,
            )
            .await
            .unwrap();
        assert_eq!(run.generated.len(), 2);
        assert_eq!(run.failed.len(), 1);
        assert_eq!(run.failed[0].employee_id, 999);
        assert!(matches!(run.failed[0].error, HrmError::NotFound(_)));

        let own = fx
            .ctx
            .payroll
            .list_payrolls(fx.alice, PayrollQuery::default())
            .await
            .unwrap();
        assert_eq!(own.total, 1);
        assert_eq!(own.data[0].employee_id, fx.alice);
    }

    #[tokio::test]
    async fn unrepresentable_amounts_are_rejected() {
        let fx = Fixture::new();
        let svc = &fx.ctx.payroll;
        let request = GeneratePayroll {
            employee_id: fx.alice,
            pay_period_start: date(2026, 3, 1),
            pay_period_end: date(2026, 3, 15),
            bonuses: Decimal::MAX,
        };
        let err = svc.generate_payroll(fx.hr, request.clone()).await.unwrap_err();
        assert!(matches!(err, HrmError::Validation(_)));

        let payroll = svc
            .generate_payroll(
                fx.hr,
                GeneratePayroll {
                    bonuses: Decimal::ZERO,
                    ..request
                },
            )
            .await
            .unwrap();
        for changes in [
            UpdatePayroll {
                bonuses: Some(Decimal::MAX),
                other_deduction: None,
            },
            UpdatePayroll {
                bonuses: None,
                other_deduction: Some(Decimal::MAX),
            },
        ] {
            let err = svc.update_payroll(fx.hr, payroll.id, changes).await.unwrap_err();
            assert!(matches!(err, HrmError::Validation(_)));
        }
        let unchanged = svc.get_payroll(fx.hr, payroll.id).await.unwrap();
        assert_eq!(unchanged, payroll);
    }

    #[tokio::test]
    async fn generation_that_loses_the_insert_race_conflicts() {
        let fx = Fixture::with_stores(Stores {
            payroll: Arc::new(FaultyStore::new(
                MemoryStore::<Payroll>::new(),
                Fault::LostCreateRace,
            )),
            ..Stores::in_memory()
        });
        let err = fx
            .ctx
            .payroll
            .generate_payroll(
                fx.hr,
                GeneratePayroll {
                    employee_id: fx.alice,
                    pay_period_start: date(2026, 3, 1),
                    pay_period_end: date(2026, 3, 15),
                    bonuses: Decimal::ZERO,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HrmError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_refuses_payroll_processed_after_it_was_read() {
        let inner = MemoryStore::<Payroll>::new();
        let draft = inner
            .create(Payroll {
                id: 0,
                employee_id: 1,
                pay_period_start: date(2026, 2, 1),
                pay_period_end: date(2026, 2, 28),
                base_salary: dec!(5753.42),
                overtime_hours: Decimal::ZERO,
                overtime_rate: dec!(54.09),
                bonuses: Decimal::ZERO,
                deductions: Deductions::default(),
                gross_pay: dec!(5753.42),
                total_deductions: Decimal::ZERO,
                net_pay: dec!(5753.42),
                status: PayrollStatus::Draft,
                processed_by: None,
                processed_at: None,
                paid_at: None,
            })
            .await
            .unwrap();
        let mut processed = draft.clone();
        processed.status = PayrollStatus::Processed;
        processed.processed_by = Some(3);
        inner.update(processed).await.unwrap();

        let store: Arc<dyn DocumentStore<Payroll>> =
            Arc::new(FaultyStore::new(inner, Fault::StaleRead(draft.clone())));
        let fx = Fixture::with_stores(Stores {
            payroll: store.clone(),
            ..Stores::in_memory()
        });

        let err = fx.ctx.payroll.delete_payroll(fx.hr, draft.id).await.unwrap_err();
        assert!(matches!(err, HrmError::Conflict(_)));
        let kept = store.find_by_id(draft.id).await.unwrap().unwrap();
        assert_eq!(kept.status, PayrollStatus::Processed);
    }
}
