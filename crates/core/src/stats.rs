//! Dashboard statistics computed over a [`Dataset`] snapshot.
//!
//! Every function here is pure; caching and timing live in the app crate.
//! Result types round-trip through serde so they can be stored in the
//! stats cache.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::query::EmployeeQuery;
use crate::types::{Dataset, Employee, RoleChangeKind, RoleHistory, Seniority, User};

pub const DEFAULT_RECENT_ITEMS_LIMIT: usize = 10;
pub const DASHBOARD_RECENT_USERS_LIMIT: usize = 5;
pub const BUDGET_WARNING_THRESHOLD: f64 = 60.0;
pub const BUDGET_DANGER_THRESHOLD: f64 = 80.0;

/// First date still inside a window of `days` days ending at `as_of`.
pub fn recent_threshold(as_of: NaiveDate, days: u32) -> Result<NaiveDate, ValidationError> {
    if days == 0 {
        return Err(ValidationError::InvalidActivityDays(0));
    }
    as_of
        .checked_sub_days(Days::new(u64::from(days)))
        .ok_or(ValidationError::InvalidActivityDays(i64::from(days)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Healthy,
    Warning,
    Danger,
}

impl BudgetStatus {
    pub fn from_usage(percentage: f64) -> Self {
        if percentage >= BUDGET_DANGER_THRESHOLD {
            Self::Danger
        } else if percentage >= BUDGET_WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentStats {
    pub department_id: i64,
    pub name: String,
    pub manager_name: Option<String>,
    pub headcount: usize,
    pub active_count: usize,
    pub terminated_count: usize,
    pub average_tenure_days: Option<f64>,
    pub total_active_salary: i64,
    pub average_active_salary: Option<f64>,
    pub budget: Option<i64>,
    pub budget_usage_percentage: Option<f64>,
    pub remaining_budget: Option<i64>,
    pub budget_status: Option<BudgetStatus>,
}

/// Per-department headcount, tenure, salary and budget figures.
///
/// Employees belong to the department of their current role. Budget usage is
/// only reported when both the budget and the active salary total are
/// non-zero.
pub fn department_overview(dataset: &Dataset, as_of: NaiveDate) -> Vec<DepartmentStats> {
    dataset
        .departments()
        .iter()
        .map(|department| {
            let members: Vec<&Employee> = dataset
                .employees()
                .iter()
                .filter(|employee| {
                    dataset
                        .department_of(employee)
                        .is_some_and(|owner| owner.id == department.id)
                })
                .collect();
            let active: Vec<&Employee> = members
                .iter()
                .copied()
                .filter(|employee| employee.is_active_on(as_of))
                .collect();

            let average_tenure_days = (!members.is_empty()).then(|| {
                members
                    .iter()
                    .map(|employee| employee.tenure_days(as_of) as f64)
                    .sum::<f64>()
                    / members.len() as f64
            });
            let total_active_salary: i64 =
                active.iter().map(|employee| employee.current_salary).sum();
            let average_active_salary = (!active.is_empty())
                .then(|| total_active_salary as f64 / active.len() as f64);

            let usage = department
                .budget
                .filter(|budget| *budget != 0 && total_active_salary != 0)
                .map(|budget| (budget, total_active_salary as f64 / budget as f64 * 100.0));

            DepartmentStats {
                department_id: department.id,
                name: department.name.clone(),
                manager_name: department
                    .manager_id
                    .and_then(|id| dataset.employee(id))
                    .map(|manager| manager.full_name.clone()),
                headcount: members.len(),
                active_count: active.len(),
                terminated_count: members.len() - active.len(),
                average_tenure_days,
                total_active_salary,
                average_active_salary,
                budget: department.budget,
                budget_usage_percentage: usage.map(|(_, percentage)| percentage),
                remaining_budget: usage.map(|(budget, _)| budget - total_active_salary),
                budget_status: usage.map(|(_, percentage)| BudgetStatus::from_usage(percentage)),
            }
        })
        .collect()
}

/// Active headcount per seniority tier. Always carries all three tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeniorityBreakdown {
    #[serde(rename = "JUNIOR")]
    pub junior: usize,
    #[serde(rename = "MID")]
    pub mid: usize,
    #[serde(rename = "SENIOR")]
    pub senior: usize,
}

impl SeniorityBreakdown {
    pub fn of<'a>(employees: impl IntoIterator<Item = &'a Employee>) -> Self {
        let mut breakdown = Self::default();
        for employee in employees {
            match employee.seniority {
                Seniority::Junior => breakdown.junior += 1,
                Seniority::Mid => breakdown.mid += 1,
                Seniority::Senior => breakdown.senior += 1,
            }
        }
        breakdown
    }

    pub fn total(&self) -> usize {
        self.junior + self.mid + self.senior
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyOverview {
    pub as_of: NaiveDate,
    pub active_headcount: usize,
    pub seniority_breakdown: SeniorityBreakdown,
    pub recent_activity_days: u32,
    pub recent_hires: usize,
}

pub fn company_overview(
    dataset: &Dataset,
    as_of: NaiveDate,
    recent_days: u32,
) -> Result<CompanyOverview, ValidationError> {
    let active = EmployeeQuery::new().active(as_of).materialize(dataset)?;
    let threshold = recent_threshold(as_of, recent_days)?;
    let recent_hires = EmployeeQuery::new()
        .hired_since(threshold)
        .materialize(dataset)?
        .into_iter()
        .filter(|employee| employee.hire_date <= as_of)
        .count();

    Ok(CompanyOverview {
        as_of,
        active_headcount: active.len(),
        seniority_breakdown: SeniorityBreakdown::of(active),
        recent_activity_days: recent_days,
        recent_hires,
    })
}

/// Flattened employee row used in listings and dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub role_title: Option<String>,
    pub department: Option<String>,
    pub seniority: Seniority,
    pub hire_date: NaiveDate,
    pub termination_date: Option<NaiveDate>,
}

impl EmployeeSummary {
    pub fn of(dataset: &Dataset, employee: &Employee) -> Self {
        Self {
            id: employee.id,
            user_id: employee.user_id,
            full_name: employee.full_name.clone(),
            role_title: dataset
                .role(employee.role_id)
                .map(|role| role.title.clone()),
            department: dataset
                .department_of(employee)
                .map(|department| department.name.clone()),
            seniority: employee.seniority,
            hire_date: employee.hire_date,
            termination_date: employee.termination_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentHires {
    pub days: u32,
    pub count: usize,
    pub hires: Vec<EmployeeSummary>,
}

/// Employees hired within the last `days` days, newest first.
pub fn recent_hires(
    dataset: &Dataset,
    as_of: NaiveDate,
    days: u32,
) -> Result<RecentHires, ValidationError> {
    let threshold = recent_threshold(as_of, days)?;
    let mut hires: Vec<&Employee> = EmployeeQuery::new()
        .hired_since(threshold)
        .materialize(dataset)?
        .into_iter()
        .filter(|employee| employee.hire_date <= as_of)
        .collect();
    hires.sort_by(|a, b| b.hire_date.cmp(&a.hire_date).then_with(|| a.id.cmp(&b.id)));

    Ok(RecentHires {
        days,
        count: hires.len(),
        hires: hires
            .into_iter()
            .map(|employee| EmployeeSummary::of(dataset, employee))
            .collect(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemOverview {
    pub total_users: usize,
    pub active_employees: usize,
    pub total_departments: usize,
}

pub fn system_overview(dataset: &Dataset, as_of: NaiveDate) -> SystemOverview {
    SystemOverview {
        total_users: dataset.users().len(),
        active_employees: dataset
            .employees()
            .iter()
            .filter(|employee| employee.is_active_on(as_of))
            .count(),
        total_departments: dataset.departments().len(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub date_joined: DateTime<Utc>,
    pub employee_id: Option<i64>,
}

impl UserSummary {
    fn of(dataset: &Dataset, user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            full_name: user.full_name(),
            email: user.email.clone(),
            date_joined: user.date_joined,
            employee_id: dataset.employee_for_user(user.id).map(|employee| employee.id),
        }
    }
}

fn newest_first(users: &mut [&User]) {
    users.sort_by(|a, b| b.date_joined.cmp(&a.date_joined).then_with(|| a.id.cmp(&b.id)));
}

/// Users that have no employee profile, most recently joined first.
pub fn users_without_profile(dataset: &Dataset) -> Vec<UserSummary> {
    let mut users: Vec<&User> = dataset
        .users()
        .iter()
        .filter(|user| dataset.employee_for_user(user.id).is_none())
        .collect();
    newest_first(&mut users);
    users
        .into_iter()
        .map(|user| UserSummary::of(dataset, user))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub name: String,
    pub user_count: usize,
}

/// Member count for every group, including empty ones, ordered by name.
pub fn group_distribution(dataset: &Dataset) -> Vec<GroupCount> {
    dataset
        .groups()
        .iter()
        .map(|group| GroupCount {
            name: group.name.clone(),
            user_count: dataset
                .users()
                .iter()
                .filter(|user| user.in_group(&group.name))
                .count(),
        })
        .collect()
}

/// Users who joined within the last `days` days, newest first, at most `limit`.
pub fn recent_users(
    dataset: &Dataset,
    now: DateTime<Utc>,
    days: u32,
    limit: usize,
) -> Result<Vec<UserSummary>, ValidationError> {
    if limit == 0 {
        return Err(ValidationError::InvalidLimit(0));
    }
    let threshold = recent_threshold(now.date_naive(), days)?;
    let mut users: Vec<&User> = dataset
        .users()
        .iter()
        .filter(|user| {
            let joined = user.date_joined.date_naive();
            joined >= threshold && user.date_joined <= now
        })
        .collect();
    newest_first(&mut users);
    Ok(users
        .into_iter()
        .take(limit)
        .map(|user| UserSummary::of(dataset, user))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmploymentDuration {
    pub days_employed: i64,
    pub years_employed: i64,
    pub months_employed: i64,
}

impl EmploymentDuration {
    /// Whole years and months use flat 365 and 30 day units.
    pub fn from_days(days: i64) -> Self {
        Self {
            days_employed: days,
            years_employed: days / 365,
            months_employed: days / 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub total_members: usize,
    pub junior_count: usize,
    pub mid_count: usize,
    pub senior_count: usize,
}

pub fn team_stats(team: &[&Employee]) -> TeamStats {
    let breakdown = SeniorityBreakdown::of(team.iter().copied());
    TeamStats {
        total_members: breakdown.total(),
        junior_count: breakdown.junior,
        mid_count: breakdown.mid,
        senior_count: breakdown.senior,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentTeam {
    pub department: String,
    pub members: Vec<EmployeeSummary>,
}

pub const UNASSIGNED_DEPARTMENT: &str = "Unassigned";

/// Groups team members by the department of their current role, by name.
pub fn team_by_department(dataset: &Dataset, team: &[&Employee]) -> Vec<DepartmentTeam> {
    let mut grouped: BTreeMap<String, Vec<EmployeeSummary>> = BTreeMap::new();
    for member in team {
        let department = dataset
            .department_of(member)
            .map(|department| department.name.clone())
            .unwrap_or_else(|| UNASSIGNED_DEPARTMENT.to_string());
        grouped
            .entry(department)
            .or_default()
            .push(EmployeeSummary::of(dataset, member));
    }
    grouped
        .into_iter()
        .map(|(department, members)| DepartmentTeam {
            department,
            members,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeContext {
    pub employee: EmployeeSummary,
    pub current_salary: i64,
    pub manager: Option<EmployeeSummary>,
    pub employment: EmploymentDuration,
    pub direct_reports: Vec<EmployeeSummary>,
    pub team_stats: TeamStats,
    pub team_by_department: Vec<DepartmentTeam>,
}

/// Profile, manager and active team of one employee.
pub fn employee_context(
    dataset: &Dataset,
    employee_id: i64,
    as_of: NaiveDate,
) -> Option<EmployeeContext> {
    let employee = dataset.employee(employee_id)?;
    let team: Vec<&Employee> = dataset
        .direct_reports(employee_id)
        .into_iter()
        .filter(|member| member.is_active_on(as_of))
        .collect();

    Some(EmployeeContext {
        employee: EmployeeSummary::of(dataset, employee),
        current_salary: employee.current_salary,
        manager: employee
            .manager_id
            .and_then(|id| dataset.employee(id))
            .map(|manager| EmployeeSummary::of(dataset, manager)),
        employment: EmploymentDuration::from_days(employee.tenure_days(as_of)),
        direct_reports: team
            .iter()
            .map(|member| EmployeeSummary::of(dataset, member))
            .collect(),
        team_stats: team_stats(&team),
        team_by_department: team_by_department(dataset, &team),
    })
}

/// Active employee whose latest raise is older than the lookback window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleEmployee {
    pub employee: EmployeeSummary,
    pub current_salary: i64,
    pub last_salary_change: Option<NaiveDate>,
}

pub fn stale_employees(
    dataset: &Dataset,
    months: u32,
    as_of: NaiveDate,
) -> Result<Vec<StaleEmployee>, ValidationError> {
    Ok(EmployeeQuery::new()
        .active(as_of)
        .without_recent_raise(months, as_of)
        .materialize(dataset)?
        .into_iter()
        .map(|employee| StaleEmployee {
            employee: EmployeeSummary::of(dataset, employee),
            current_salary: employee.current_salary,
            last_salary_change: dataset
                .latest_salary_entry(employee.id)
                .map(|entry| entry.effective_date),
        })
        .collect())
}

/// Role history row resolved to names for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangeRecord {
    pub id: i64,
    pub employee_id: i64,
    pub employee_name: Option<String>,
    pub old_role: Option<String>,
    pub new_role: Option<String>,
    pub old_seniority: Seniority,
    pub new_seniority: Seniority,
    pub effective_date: NaiveDate,
    pub kind: RoleChangeKind,
}

/// Resolves rows to names, most recent first.
pub fn role_change_records(dataset: &Dataset, rows: &[&RoleHistory]) -> Vec<RoleChangeRecord> {
    let title = |role_id: i64| dataset.role(role_id).map(|role| role.title.clone());
    rows.iter()
        .rev()
        .map(|entry| RoleChangeRecord {
            id: entry.id,
            employee_id: entry.employee_id,
            employee_name: dataset
                .employee(entry.employee_id)
                .map(|employee| employee.full_name.clone()),
            old_role: title(entry.old_role_id),
            new_role: title(entry.new_role_id),
            old_seniority: entry.old_seniority,
            new_seniority: entry.new_seniority,
            effective_date: entry.effective_date,
            kind: entry.kind,
        })
        .collect()
}
