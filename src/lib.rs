//! Leave, attendance and payroll computation for an HR back office.
//!
//! Services live in [`api`] and are wired together by [`context::AppContext`];
//! employee records come from an injected [`directory::EmployeeDirectory`].

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod directory;
pub mod error;
pub mod model;
pub mod seed;
pub mod utils;

pub use context::{AppContext, Stores};
pub use error::{HrmError, Result};

#[cfg(test)]
pub(crate) mod test_support;
