use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AccessError;
use crate::types::{Dataset, Employee, User};

pub const ADMIN_GROUP: &str = "Admin";
pub const HR_GROUP: &str = "HR";
pub const TEAM_LEAD_GROUP: &str = "Team Lead";

/// Dashboard a user lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardKind {
    Admin,
    Hr,
    TeamLead,
    Employee,
}

impl DashboardKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Hr => "hr",
            Self::TeamLead => "team_lead",
            Self::Employee => "employee",
        }
    }
}

/// Resolves the dashboard for `user_id`.
///
/// Priority: superuser or Admin group, HR group, Team Lead group or active
/// direct reports, otherwise the employee dashboard. Team lead and employee
/// dashboards require an active employee profile.
pub fn resolve_dashboard(
    dataset: &Dataset,
    user_id: i64,
    as_of: NaiveDate,
) -> Result<DashboardKind, AccessError> {
    let user = dataset
        .user(user_id)
        .ok_or(AccessError::UnknownUser(user_id))?;

    if user.is_superuser || user.in_group(ADMIN_GROUP) {
        return Ok(DashboardKind::Admin);
    }
    if user.in_group(HR_GROUP) {
        return Ok(DashboardKind::Hr);
    }

    let employee = active_employee(dataset, user, as_of)?;
    if user.in_group(TEAM_LEAD_GROUP) || leads_team(dataset, employee, as_of) {
        return Ok(DashboardKind::TeamLead);
    }
    Ok(DashboardKind::Employee)
}

/// Employee profile of `user`, provided it is active on `as_of`.
pub fn active_employee<'a>(
    dataset: &'a Dataset,
    user: &User,
    as_of: NaiveDate,
) -> Result<&'a Employee, AccessError> {
    let employee = dataset
        .employee_for_user(user.id)
        .ok_or_else(|| AccessError::EmployeeNotFound(user.username.clone()))?;
    if !employee.is_active_on(as_of) {
        return Err(AccessError::InactiveEmployee(user.username.clone()));
    }
    Ok(employee)
}

fn leads_team(dataset: &Dataset, employee: &Employee, as_of: NaiveDate) -> bool {
    dataset
        .direct_reports(employee.id)
        .iter()
        .any(|member| member.is_active_on(as_of))
}
