use chrono::NaiveDate;
use thiserror::Error;

/// Rejected parameters or write requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("year {0} is outside the supported range 1900..=9999")]
    InvalidYear(i32),
    #[error("month {0} must be between 1 and 12")]
    InvalidMonth(u32),
    #[error("date range start {start} is after end {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
    #[error("limit must be at least 1 (got {0})")]
    InvalidLimit(i64),
    #[error("lookback must be at least 1 month (got {0})")]
    InvalidLookbackMonths(i64),
    #[error("activity window must be at least 1 day (got {0})")]
    InvalidActivityDays(i64),
    #[error("salary amount must be positive (got {0})")]
    NonPositiveSalary(i64),
    #[error("new salary {0} cannot be the same as the current salary")]
    UnchangedSalary(i64),
    #[error("effective date {effective} is before hire date {hired}")]
    BeforeHireDate {
        effective: NaiveDate,
        hired: NaiveDate,
    },
    #[error("effective date {effective} is before the latest recorded change on {latest}")]
    BeforeLatestChange {
        effective: NaiveDate,
        latest: NaiveDate,
    },
    #[error("a role change requires a change in either role or seniority")]
    NoRoleChange,
    #[error("employee {0} cannot be their own manager")]
    SelfManagement(i64),
    #[error("assigning manager {manager_id} to employee {employee_id} would create a cycle")]
    ManagerCycle { employee_id: i64, manager_id: i64 },
    #[error("termination date {terminated} precedes hire date {hired}")]
    TerminationBeforeHire {
        terminated: NaiveDate,
        hired: NaiveDate,
    },
    #[error("employee {0} is already terminated")]
    AlreadyTerminated(i64),
    #[error("unknown seniority level: {0}")]
    UnknownSeniority(String),
    #[error("unknown role change classification: {0}")]
    UnknownRoleChange(String),
}

/// Reasons a user cannot be routed to a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("user {0} does not exist")]
    UnknownUser(i64),
    #[error("no employee profile for user {0}")]
    EmployeeNotFound(String),
    #[error("employee {0} is not active")]
    InactiveEmployee(String),
}
