//! Domain types and the analytics layer over HR records.
//!
//! Everything here is synchronous and storage-agnostic: the storage crate
//! produces a [`Dataset`] snapshot and the app crate caches the results.

pub mod aggregate;
pub mod dashboard;
pub mod error;
pub mod query;
pub mod stats;
pub mod types;
pub mod validation;

pub use dashboard::{resolve_dashboard, DashboardKind};
pub use error::{AccessError, ValidationError};
pub use query::{DateSpan, EmployeeQuery, RoleHistoryQuery, SalaryHistoryQuery};
pub use types::{
    Dataset, Department, Employee, Group, Records, Role, RoleChangeKind, RoleHistory,
    SalaryHistory, Seniority, User,
};
