pub mod calendar;
pub mod clock;
pub mod employee_cache;
pub mod pagination;
