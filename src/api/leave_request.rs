use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::{info, instrument, warn};

use crate::{
    auth::authorizer::Authorizer,
    config::LeavePolicy,
    db::{DocumentStore, Filter},
    directory::{EmployeeDirectory, require_active_employee},
    error::HrmError,
    model::{
        leave_request::{LeaveRequest, LeaveStatus, LeaveType},
        role::Capability,
    },
    utils::{
        clock::Clock,
        pagination::{Page, PageRequest},
    },
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeave {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLeave {
    pub leave_type: Option<LeaveType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaveFilter {
    /// Filter by employee ID
    pub employee_id: Option<u64>,
    /// Filter by leave status
    pub status: Option<LeaveStatus>,
    pub leave_type: Option<LeaveType>,
    #[serde(flatten)]
    pub page: PageRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveTypeBalance {
    pub leave_type: LeaveType,
    /// `None` for leave types without a yearly allowance.
    pub allocated: Option<u32>,
    pub used: u32,
    pub remaining: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveBalance {
    pub employee_id: u64,
    pub year: i32,
    pub balances: Vec<LeaveTypeBalance>,
}

impl LeaveBalance {
    pub fn remaining(&self, leave_type: LeaveType) -> Option<i64> {
        self.balances
            .iter()
            .find(|b| b.leave_type == leave_type)
            .and_then(|b| b.remaining)
    }
}

/// Balance for `year` from the employee's requests: each budgeted type's
/// allocation minus the days of its approved requests starting that year.
pub fn compute_balance(
    requests: &[LeaveRequest],
    employee_id: u64,
    year: i32,
    policy: &LeavePolicy,
) -> LeaveBalance {
    let balances = LeaveType::iter()
        .map(|leave_type| {
            let used: u32 = requests
                .iter()
                .filter(|r| {
                    r.employee_id == employee_id
                        && r.leave_type == leave_type
                        && r.status == LeaveStatus::Approved
                        && r.start_date.year() == year
                })
                .map(|r| r.days_requested)
                .sum();
            let allocated = leave_type.allocation(policy);
            LeaveTypeBalance {
                leave_type,
                allocated,
                used,
                remaining: allocated.map(|a| i64::from(a) - i64::from(used)),
            }
        })
        .collect();

    LeaveBalance {
        employee_id,
        year,
        balances,
    }
}

/// First pending/approved request that shares a day with `[start, end]`,
/// ignoring the request with id `exclude`.
pub fn find_overlap(
    existing: &[LeaveRequest],
    start: NaiveDate,
    end: NaiveDate,
    exclude: Option<u64>,
) -> Option<&LeaveRequest> {
    existing
        .iter()
        .filter(|r| Some(r.id) != exclude)
        .find(|r| r.status.is_active() && r.overlaps(start, end))
}

fn check_remaining(balance: &LeaveBalance, leave_type: LeaveType, days: u32) -> Result<(), HrmError> {
    match balance.remaining(leave_type) {
        Some(remaining) if i64::from(days) > remaining => Err(HrmError::validation(format!(
            "insufficient {leave_type} leave balance: requested {days}, remaining {remaining}"
        ))),
        _ => Ok(()),
    }
}

fn validate_request(
    start: NaiveDate,
    end: NaiveDate,
    reason: &str,
    policy: &LeavePolicy,
) -> Result<(), HrmError> {
    if start > end {
        return Err(HrmError::validation("start_date cannot be after end_date"));
    }
    if reason.trim().chars().count() < policy.min_reason_len {
        return Err(HrmError::validation(format!(
            "reason must be at least {} characters",
            policy.min_reason_len
        )));
    }
    Ok(())
}

pub struct LeaveService {
    store: Arc<dyn DocumentStore<LeaveRequest>>,
    directory: Arc<dyn EmployeeDirectory>,
    auth: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    policy: LeavePolicy,
}

impl LeaveService {
    pub fn new(
        store: Arc<dyn DocumentStore<LeaveRequest>>,
        directory: Arc<dyn EmployeeDirectory>,
        auth: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        policy: LeavePolicy,
    ) -> Self {
        Self {
            store,
            directory,
            auth,
            clock,
            policy,
        }
    }

    async fn fetch(&self, leave_id: u64) -> Result<LeaveRequest, HrmError> {
        self.store
            .find_by_id(leave_id)
            .await?
            .ok_or_else(|| HrmError::not_found(format!("leave request {leave_id}")))
    }

    async fn employee_requests(&self, employee_id: u64) -> Result<Vec<LeaveRequest>, HrmError> {
        let filter = Filter::new().eq("employee_id", employee_id);
        Ok(self.store.find(&filter).await?)
    }

    async fn balance_from_store(&self, employee_id: u64, year: i32) -> Result<LeaveBalance, HrmError> {
        let filter = Filter::new()
            .eq("employee_id", employee_id)
            .eq("status", LeaveStatus::Approved.as_ref());
        let approved = self.store.find(&filter).await?;
        Ok(compute_balance(&approved, employee_id, year, &self.policy))
    }

    /// Balance used to gate new requests. If it cannot be read, the full
    /// allocation is assumed so that requests are not blocked.
    async fn balance_or_default(&self, employee_id: u64, year: i32) -> LeaveBalance {
        match self.balance_from_store(employee_id, year).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, employee_id, year, "Leave balance unavailable, using default allocation");
                compute_balance(&[], employee_id, year, &self.policy)
            }
        }
    }

    async fn ensure_balance(
        &self,
        employee_id: u64,
        leave_type: LeaveType,
        start: NaiveDate,
        days: u32,
    ) -> Result<(), HrmError> {
        if leave_type.allocation(&self.policy).is_none() {
            return Ok(());
        }
        let balance = self.balance_or_default(employee_id, start.year()).await;
        check_remaining(&balance, leave_type, days)
    }

    /// Files a pending request for `employee_id`.
    #[instrument(name = "create_leave_request", skip(self, payload), fields(leave_type = %payload.leave_type))]
    pub async fn create_leave_request(
        &self,
        employee_id: u64,
        payload: CreateLeave,
    ) -> Result<LeaveRequest, HrmError> {
        validate_request(payload.start_date, payload.end_date, &payload.reason, &self.policy)?;
        require_active_employee(self.directory.as_ref(), employee_id).await?;

        let existing = self.employee_requests(employee_id).await?;
        if let Some(clash) = find_overlap(&existing, payload.start_date, payload.end_date, None) {
            return Err(HrmError::conflict(format!(
                "overlaps leave request {} ({} to {})",
                clash.id, clash.start_date, clash.end_date
            )));
        }

        let days = LeaveRequest::days_between(payload.start_date, payload.end_date);
        self.ensure_balance(employee_id, payload.leave_type, payload.start_date, days)
            .await?;

        let now = self.clock.now();
        let created = self
            .store
            .create(LeaveRequest {
                id: 0,
                employee_id,
                leave_type: payload.leave_type,
                start_date: payload.start_date,
                end_date: payload.end_date,
                reason: payload.reason.trim().to_string(),
                status: LeaveStatus::Pending,
                approver_id: None,
                review_comments: None,
                days_requested: days,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(leave_id = created.id, days, "Leave request submitted");
        Ok(created)
    }

    pub async fn get_leave_request(&self, actor_id: u64, leave_id: u64) -> Result<LeaveRequest, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        let leave = self.fetch(leave_id).await?;
        actor.require_owner_or(leave.employee_id, Capability::ViewAllLeave)?;
        Ok(leave)
    }

    /// Reviewers see every request; everyone else only their own.
    pub async fn list_leave_requests(
        &self,
        actor_id: u64,
        mut query: LeaveFilter,
    ) -> Result<Page<LeaveRequest>, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        if !actor.role.can(Capability::ViewAllLeave) {
            match query.employee_id {
                Some(id) if id != actor_id => {
                    return Err(HrmError::permission("cannot list other employees' leave"));
                }
                _ => query.employee_id = Some(actor_id),
            }
        }

        let filter = Filter::new()
            .eq_opt("employee_id", query.employee_id)
            .eq_opt("status", query.status.map(|s| s.as_ref().to_string()))
            .eq_opt("leave_type", query.leave_type.map(|t| t.as_ref().to_string()));

        let mut leaves = self.store.find(&filter).await?;
        leaves.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(query.page.paginate(leaves))
    }

    /// Owner edits a request that is still pending.
    #[instrument(name = "update_leave_request", skip(self, changes))]
    pub async fn update_leave_request(
        &self,
        actor_id: u64,
        leave_id: u64,
        changes: UpdateLeave,
    ) -> Result<LeaveRequest, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        let current = self.fetch(leave_id).await?;
        actor.require_owner(current.employee_id, "edit a leave request")?;
        if current.status != LeaveStatus::Pending {
            return Err(HrmError::conflict(format!("leave request is {}", current.status)));
        }

        let mut updated = current.clone();
        if let Some(leave_type) = changes.leave_type {
            updated.leave_type = leave_type;
        }
        if let Some(start) = changes.start_date {
            updated.start_date = start;
        }
        if let Some(end) = changes.end_date {
            updated.end_date = end;
        }
        if let Some(reason) = changes.reason {
            updated.reason = reason.trim().to_string();
        }
        validate_request(updated.start_date, updated.end_date, &updated.reason, &self.policy)?;

        let existing = self.employee_requests(actor_id).await?;
        if let Some(clash) = find_overlap(&existing, updated.start_date, updated.end_date, Some(leave_id)) {
            return Err(HrmError::conflict(format!(
                "overlaps leave request {} ({} to {})",
                clash.id, clash.start_date, clash.end_date
            )));
        }

        updated.days_requested = LeaveRequest::days_between(updated.start_date, updated.end_date);
        self.ensure_balance(actor_id, updated.leave_type, updated.start_date, updated.days_requested)
            .await?;
        updated.updated_at = self.clock.now();

        let guard = Filter::new().eq("status", LeaveStatus::Pending.as_ref());
        let saved = self
            .store
            .update_where(updated, &guard)
            .await?
            .ok_or_else(|| HrmError::conflict("leave request was processed concurrently"))?;

        info!(leave_id, days = saved.days_requested, "Leave request updated");
        Ok(saved)
    }

    async fn review(
        &self,
        actor_id: u64,
        leave_id: u64,
        decision: LeaveStatus,
        comments: Option<String>,
    ) -> Result<LeaveRequest, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require(Capability::ReviewLeave)?;

        let mut leave = self.fetch(leave_id).await?;
        if leave.status != LeaveStatus::Pending {
            warn!(leave_id, status = %leave.status, "Review of processed leave request refused");
            return Err(HrmError::conflict(format!(
                "leave request already {}",
                leave.status
            )));
        }

        // pending requests that each fit may not all fit together
        if decision == LeaveStatus::Approved {
            let balance = self
                .balance_from_store(leave.employee_id, leave.start_date.year())
                .await?;
            check_remaining(&balance, leave.leave_type, leave.days_requested)?;
        }

        leave.status = decision;
        leave.approver_id = Some(actor_id);
        leave.review_comments = comments;
        leave.updated_at = self.clock.now();

        let guard = Filter::new().eq("status", LeaveStatus::Pending.as_ref());
        let saved = self
            .store
            .update_where(leave, &guard)
            .await?
            .ok_or_else(|| HrmError::conflict("leave request already processed"))?;

        info!(leave_id, approver_id = actor_id, status = %saved.status, "Leave request reviewed");
        Ok(saved)
    }

    #[instrument(name = "approve_leave_request", skip(self, comments))]
    pub async fn approve_leave_request(
        &self,
        actor_id: u64,
        leave_id: u64,
        comments: Option<String>,
    ) -> Result<LeaveRequest, HrmError> {
        self.review(actor_id, leave_id, LeaveStatus::Approved, comments)
            .await
    }

    #[instrument(name = "reject_leave_request", skip(self, comments))]
    pub async fn reject_leave_request(
        &self,
        actor_id: u64,
        leave_id: u64,
        comments: Option<String>,
    ) -> Result<LeaveRequest, HrmError> {
        self.review(actor_id, leave_id, LeaveStatus::Rejected, comments)
            .await
    }

    /// Owner withdraws a pending request, or an approved one that has not started.
    #[instrument(name = "cancel_leave_request", skip(self))]
    pub async fn cancel_leave_request(&self, actor_id: u64, leave_id: u64) -> Result<LeaveRequest, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        let mut leave = self.fetch(leave_id).await?;
        actor.require_owner(leave.employee_id, "cancel a leave request")?;

        let today = self.clock.today();
        let cancellable = match leave.status {
            LeaveStatus::Pending => true,
            LeaveStatus::Approved => leave.start_date > today,
            LeaveStatus::Rejected | LeaveStatus::Cancelled => false,
        };
        if !cancellable {
            return Err(HrmError::conflict(format!(
                "{} leave starting {} cannot be cancelled",
                leave.status, leave.start_date
            )));
        }

        let guard = Filter::new().eq("status", leave.status.as_ref());
        leave.status = LeaveStatus::Cancelled;
        leave.updated_at = self.clock.now();

        let saved = self
            .store
            .update_where(leave, &guard)
            .await?
            .ok_or_else(|| HrmError::conflict("leave request changed concurrently"))?;

        info!(leave_id, "Leave request cancelled");
        Ok(saved)
    }

    /// Owner removes a request that is still pending.
    #[instrument(name = "delete_leave_request", skip(self))]
    pub async fn delete_leave_request(&self, actor_id: u64, leave_id: u64) -> Result<(), HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        let leave = self.fetch(leave_id).await?;
        actor.require_owner(leave.employee_id, "delete a leave request")?;
        if leave.status != LeaveStatus::Pending {
            return Err(HrmError::conflict(format!(
                "only pending requests can be deleted, this one is {}",
                leave.status
            )));
        }

        let guard = Filter::new().eq("status", LeaveStatus::Pending.as_ref());
        if !self.store.delete_where(leave_id, &guard).await? {
            return Err(HrmError::conflict("leave request was processed concurrently"));
        }
        info!(leave_id, "Leave request deleted");
        Ok(())
    }

    pub async fn leave_balance(
        &self,
        actor_id: u64,
        employee_id: u64,
        year: i32,
    ) -> Result<LeaveBalance, HrmError> {
        let actor = self.auth.authenticate(actor_id).await?;
        actor.require_owner_or(employee_id, Capability::ViewAllLeave)?;
        self.balance_from_store(employee_id, year).await
    }
}
