use std::sync::Arc;

use crate::{
    api::{attendance::AttendanceService, leave_request::LeaveService, payroll::PayrollService},
    auth::authorizer::{Authorizer, DirectoryAuthorizer},
    config::Config,
    db::{DocumentStore, init_db},
    directory::EmployeeDirectory,
    model::{attendance::Attendance, leave_request::LeaveRequest, payroll::Payroll},
    utils::{clock::Clock, employee_cache::CachedDirectory},
};

/// Record stores backing the services.
#[derive(Clone)]
pub struct Stores {
    pub leave: Arc<dyn DocumentStore<LeaveRequest>>,
    pub attendance: Arc<dyn DocumentStore<Attendance>>,
    pub payroll: Arc<dyn DocumentStore<Payroll>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            leave: init_db(),
            attendance: init_db(),
            payroll: init_db(),
        }
    }
}

/// Every service wired to one set of collaborators.
pub struct AppContext {
    pub config: Config,
    pub stores: Stores,
    pub directory: Arc<dyn EmployeeDirectory>,
    pub leave: LeaveService,
    pub attendance: AttendanceService,
    pub payroll: PayrollService,
}

impl AppContext {
    /// Wraps `directory` in a cache and derives roles from it.
    pub fn new(
        config: Config,
        stores: Stores,
        directory: Arc<dyn EmployeeDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let directory: Arc<dyn EmployeeDirectory> =
            Arc::new(CachedDirectory::new(directory, &config));
        let auth: Arc<dyn Authorizer> = Arc::new(DirectoryAuthorizer::new(directory.clone()));
        Self::with_authorizer(config, stores, directory, auth, clock)
    }

    pub fn with_authorizer(
        config: Config,
        stores: Stores,
        directory: Arc<dyn EmployeeDirectory>,
        auth: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let leave = LeaveService::new(
            stores.leave.clone(),
            directory.clone(),
            auth.clone(),
            clock.clone(),
            config.leave.clone(),
        );
        let attendance = AttendanceService::new(
            stores.attendance.clone(),
            directory.clone(),
            auth.clone(),
            clock.clone(),
            config.attendance.clone(),
        );
        let payroll = PayrollService::new(
            stores.payroll.clone(),
            stores.attendance.clone(),
            directory.clone(),
            auth,
            clock,
            config.payroll.clone(),
            config.attendance.clone(),
        );

        Self {
            config,
            stores,
            directory,
            leave,
            attendance,
            payroll,
        }
    }
}
