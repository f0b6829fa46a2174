use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Ordinal seniority tier attached to roles and employees.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Seniority {
    Junior,
    Mid,
    Senior,
}

impl Seniority {
    pub const ALL: [Seniority; 3] = [Self::Junior, Self::Mid, Self::Senior];

    /// Returns the canonical database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Junior => "JUNIOR",
            Self::Mid => "MID",
            Self::Senior => "SENIOR",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Junior => "Junior",
            Self::Mid => "Mid",
            Self::Senior => "Senior",
        }
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Seniority {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "JUNIOR" => Ok(Self::Junior),
            "MID" => Ok(Self::Mid),
            "SENIOR" => Ok(Self::Senior),
            other => Err(ValidationError::UnknownSeniority(other.to_string())),
        }
    }
}

/// Classification of a role change, derived from the seniority bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleChangeKind {
    Promotion,
    LateralMove,
    Demotion,
}

impl RoleChangeKind {
    pub fn classify(old: Seniority, new: Seniority) -> Self {
        match new.cmp(&old) {
            std::cmp::Ordering::Greater => Self::Promotion,
            std::cmp::Ordering::Less => Self::Demotion,
            std::cmp::Ordering::Equal => Self::LateralMove,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Promotion => "promotion",
            Self::LateralMove => "lateral_move",
            Self::Demotion => "demotion",
        }
    }
}

impl FromStr for RoleChangeKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "promotion" => Ok(Self::Promotion),
            "lateral_move" => Ok(Self::LateralMove),
            "demotion" => Ok(Self::Demotion),
            other => Err(ValidationError::UnknownRoleChange(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub budget: Option<i64>,
    pub manager_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub title: String,
    pub department_id: i64,
    pub seniority: Seniority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub role_id: i64,
    pub seniority: Seniority,
    pub manager_id: Option<i64>,
    pub current_salary: i64,
    pub hire_date: NaiveDate,
    pub termination_date: Option<NaiveDate>,
}

impl Employee {
    /// Returns `true` unless the employee was terminated on or before `as_of`.
    pub fn is_active_on(&self, as_of: NaiveDate) -> bool {
        self.termination_date.map_or(true, |date| date > as_of)
    }

    /// Days employed, measured to the termination date when it precedes `as_of`.
    pub fn tenure_days(&self, as_of: NaiveDate) -> i64 {
        let end = match self.termination_date {
            Some(date) if date < as_of => date,
            _ => as_of,
        };
        (end - self.hire_date).num_days().max(0)
    }
}

/// Append-only salary record. `amount` is the salary that became effective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryHistory {
    pub id: i64,
    pub employee_id: i64,
    pub amount: i64,
    pub effective_date: NaiveDate,
}

/// Append-only role change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleHistory {
    pub id: i64,
    pub employee_id: i64,
    pub old_role_id: i64,
    pub new_role_id: i64,
    pub old_seniority: Seniority,
    pub new_seniority: Seniority,
    pub effective_date: NaiveDate,
    pub kind: RoleChangeKind,
}

impl RoleHistory {
    pub fn new(
        id: i64,
        employee_id: i64,
        (old_role_id, old_seniority): (i64, Seniority),
        (new_role_id, new_seniority): (i64, Seniority),
        effective_date: NaiveDate,
    ) -> Self {
        Self {
            id,
            employee_id,
            old_role_id,
            new_role_id,
            old_seniority,
            new_seniority,
            effective_date,
            kind: RoleChangeKind::classify(old_seniority, new_seniority),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub groups: Vec<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let trimmed = name.trim();
        if trimmed.is_empty() {
            self.username.clone()
        } else {
            trimmed.to_string()
        }
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|name| name == group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

/// Raw record collections used to assemble a [`Dataset`].
#[derive(Debug, Clone, Default)]
pub struct Records {
    pub departments: Vec<Department>,
    pub roles: Vec<Role>,
    pub employees: Vec<Employee>,
    pub salary_history: Vec<SalaryHistory>,
    pub role_history: Vec<RoleHistory>,
    pub users: Vec<User>,
    pub groups: Vec<Group>,
}

/// Indexed snapshot of every record that query builders execute against.
///
/// History rows are kept in `(effective_date, id)` order, which is the total
/// order used for "previous entry" and "latest entry" lookups.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    departments: Vec<Department>,
    roles: Vec<Role>,
    employees: Vec<Employee>,
    salary_history: Vec<SalaryHistory>,
    role_history: Vec<RoleHistory>,
    users: Vec<User>,
    groups: Vec<Group>,
    department_index: HashMap<i64, usize>,
    role_index: HashMap<i64, usize>,
    employee_index: HashMap<i64, usize>,
    employee_by_user: HashMap<i64, usize>,
    user_index: HashMap<i64, usize>,
    salary_by_employee: HashMap<i64, Vec<usize>>,
    role_changes_by_employee: HashMap<i64, Vec<usize>>,
}

impl From<Records> for Dataset {
    fn from(records: Records) -> Self {
        let Records {
            mut departments,
            mut roles,
            mut employees,
            mut salary_history,
            mut role_history,
            mut users,
            mut groups,
        } = records;

        departments.sort_by_key(|department| department.id);
        roles.sort_by_key(|role| role.id);
        employees.sort_by_key(|employee| employee.id);
        users.sort_by_key(|user| user.id);
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        salary_history.sort_by_key(|entry| (entry.effective_date, entry.id));
        role_history.sort_by_key(|entry| (entry.effective_date, entry.id));

        let department_index = index_by(&departments, |department| department.id);
        let role_index = index_by(&roles, |role| role.id);
        let employee_index = index_by(&employees, |employee| employee.id);
        let employee_by_user = index_by(&employees, |employee| employee.user_id);
        let user_index = index_by(&users, |user| user.id);

        let mut salary_by_employee: HashMap<i64, Vec<usize>> = HashMap::new();
        for (position, entry) in salary_history.iter().enumerate() {
            salary_by_employee
                .entry(entry.employee_id)
                .or_default()
                .push(position);
        }

        let mut role_changes_by_employee: HashMap<i64, Vec<usize>> = HashMap::new();
        for (position, entry) in role_history.iter().enumerate() {
            role_changes_by_employee
                .entry(entry.employee_id)
                .or_default()
                .push(position);
        }

        Self {
            departments,
            roles,
            employees,
            salary_history,
            role_history,
            users,
            groups,
            department_index,
            role_index,
            employee_index,
            employee_by_user,
            user_index,
            salary_by_employee,
            role_changes_by_employee,
        }
    }
}

fn index_by<T>(items: &[T], key: impl Fn(&T) -> i64) -> HashMap<i64, usize> {
    items
        .iter()
        .enumerate()
        .map(|(position, item)| (key(item), position))
        .collect()
}

impl Dataset {
    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    pub fn salary_history(&self) -> &[SalaryHistory] {
        &self.salary_history
    }

    pub fn role_history(&self) -> &[RoleHistory] {
        &self.role_history
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn department(&self, id: i64) -> Option<&Department> {
        self.department_index
            .get(&id)
            .map(|position| &self.departments[*position])
    }

    pub fn role(&self, id: i64) -> Option<&Role> {
        self.role_index.get(&id).map(|position| &self.roles[*position])
    }

    pub fn employee(&self, id: i64) -> Option<&Employee> {
        self.employee_index
            .get(&id)
            .map(|position| &self.employees[*position])
    }

    pub fn user(&self, id: i64) -> Option<&User> {
        self.user_index.get(&id).map(|position| &self.users[*position])
    }

    pub fn employee_for_user(&self, user_id: i64) -> Option<&Employee> {
        self.employee_by_user
            .get(&user_id)
            .map(|position| &self.employees[*position])
    }

    /// Department the employee belongs to through their current role.
    pub fn department_of(&self, employee: &Employee) -> Option<&Department> {
        self.role(employee.role_id)
            .and_then(|role| self.department(role.department_id))
    }

    /// Direct reports of `manager_id`, in id order.
    pub fn direct_reports(&self, manager_id: i64) -> Vec<&Employee> {
        self.employees
            .iter()
            .filter(|employee| employee.manager_id == Some(manager_id))
            .collect()
    }

    /// Salary entries of one employee in effective order.
    pub fn salary_timeline(&self, employee_id: i64) -> Vec<&SalaryHistory> {
        self.salary_by_employee
            .get(&employee_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|position| &self.salary_history[*position])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn latest_salary_entry(&self, employee_id: i64) -> Option<&SalaryHistory> {
        self.salary_by_employee
            .get(&employee_id)
            .and_then(|positions| positions.last())
            .map(|position| &self.salary_history[*position])
    }

    /// Amount of the entry preceding `entry` in the employee's timeline.
    pub fn previous_amount(&self, entry: &SalaryHistory) -> Option<i64> {
        let timeline = self.salary_by_employee.get(&entry.employee_id)?;
        let position = timeline
            .iter()
            .position(|index| self.salary_history[*index].id == entry.id)?;
        let previous = position.checked_sub(1)?;
        Some(self.salary_history[timeline[previous]].amount)
    }

    /// Role changes of one employee in effective order.
    pub fn role_changes(&self, employee_id: i64) -> Vec<&RoleHistory> {
        self.role_changes_by_employee
            .get(&employee_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|position| &self.role_history[*position])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Role the employee held on `date`, reconstructed from role history.
    pub fn role_at(&self, employee_id: i64, date: NaiveDate) -> Option<i64> {
        let changes = self.role_changes(employee_id);
        if let Some(change) = changes
            .iter()
            .rev()
            .find(|change| change.effective_date <= date)
        {
            return Some(change.new_role_id);
        }
        if let Some(first) = changes.first() {
            return Some(first.old_role_id);
        }
        self.employee(employee_id).map(|employee| employee.role_id)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    pub fn department(id: i64, name: &str, budget: Option<i64>) -> Department {
        Department {
            id,
            name: name.to_string(),
            description: String::new(),
            budget,
            manager_id: None,
        }
    }

    pub fn role(id: i64, title: &str, department_id: i64, seniority: Seniority) -> Role {
        Role {
            id,
            title: title.to_string(),
            department_id,
            seniority,
        }
    }

    pub fn employee(id: i64, role_id: i64, hire_date: NaiveDate) -> Employee {
        Employee {
            id,
            user_id: 100 + id,
            full_name: format!("Employee {id}"),
            role_id,
            seniority: Seniority::Junior,
            manager_id: None,
            current_salary: 50_000,
            hire_date,
            termination_date: None,
        }
    }

    pub fn salary(id: i64, employee_id: i64, amount: i64, effective_date: NaiveDate) -> SalaryHistory {
        SalaryHistory {
            id,
            employee_id,
            amount,
            effective_date,
        }
    }

    pub fn user(id: i64, username: &str, groups: &[&str]) -> User {
        User {
            id,
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: format!("{username}@example.com"),
            is_superuser: false,
            date_joined: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .expect("timestamp")
                .with_timezone(&Utc),
            groups: groups.iter().map(|group| group.to_string()).collect(),
        }
    }
}
