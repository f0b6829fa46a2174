use std::borrow::Cow;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqliteConnection, SqlitePool,
};
use thiserror::Error;

use hr_insights_core::types::{
    Dataset, Department, Employee, Group, Records, Role, RoleChangeKind, RoleHistory,
    SalaryHistory, Seniority, User,
};
use hr_insights_core::validation::{
    validate_manager_assignment, validate_role_change, validate_salary_change,
    validate_termination,
};
use hr_insights_core::ValidationError;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens a pool for the provided connection string.
    ///
    /// Foreign keys and the busy timeout are set on every pooled connection.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for user accounts and group membership.
    pub fn users(&self) -> UserRepository {
        UserRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for departments.
    pub fn departments(&self) -> DepartmentRepository {
        DepartmentRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for roles.
    pub fn roles(&self) -> RoleRepository {
        RoleRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for employees and their history tables.
    pub fn employees(&self) -> EmployeeRepository {
        EmployeeRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle that loads full analytics snapshots.
    pub fn snapshots(&self) -> SnapshotRepository {
        SnapshotRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("stored value could not be decoded: {0}")]
    Decode(#[from] ValidationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised while writing records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("employee {0} not found")]
    EmployeeNotFound(i64),
    #[error("role {0} not found")]
    RoleNotFound(i64),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("record conflicts with an existing row")]
    Conflict,
    #[error("record references a missing row")]
    MissingReference,
    #[error("record violates a table constraint")]
    Constraint,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RecordError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                if code == Cow::Borrowed("2067") || code == Cow::Borrowed("1555") {
                    return Self::Conflict;
                }
                if code == Cow::Borrowed("787") {
                    return Self::MissingReference;
                }
                if code == Cow::Borrowed("275") || code == Cow::Borrowed("1811") {
                    return Self::Constraint;
                }
            }
        }
        Self::Database(err)
    }
}

/// Data required to create a user account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

/// Repository for the `users`, `groups` and `user_groups` tables.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub async fn insert(&self, user: NewUser<'_>) -> Result<i64, RecordError> {
        let result = sqlx::query(
            "INSERT INTO users (username, first_name, last_name, email, is_superuser, date_joined) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.username)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.email)
        .bind(i64::from(user.is_superuser))
        .bind(to_rfc3339(user.date_joined))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Returns the id of the named group, creating it when missing.
    pub async fn ensure_group(&self, name: &str) -> Result<i64, RecordError> {
        sqlx::query("INSERT OR IGNORE INTO groups (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM groups WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Adds the user to the named group. Repeated calls are no-ops.
    pub async fn add_to_group(&self, user_id: i64, group: &str) -> Result<(), RecordError> {
        let group_id = self.ensure_group(group).await?;
        sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewDepartment<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub budget: Option<i64>,
}

/// Repository for the `departments` table.
#[derive(Clone)]
pub struct DepartmentRepository {
    pool: SqlitePool,
}

impl DepartmentRepository {
    pub async fn insert(&self, department: NewDepartment<'_>) -> Result<i64, RecordError> {
        let result =
            sqlx::query("INSERT INTO departments (name, description, budget) VALUES (?, ?, ?)")
                .bind(department.name)
                .bind(department.description)
                .bind(department.budget)
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn set_manager(
        &self,
        department_id: i64,
        manager_id: Option<i64>,
    ) -> Result<(), RecordError> {
        sqlx::query("UPDATE departments SET manager_id = ? WHERE id = ?")
            .bind(manager_id)
            .bind(department_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewRole<'a> {
    pub title: &'a str,
    pub department_id: i64,
    pub seniority: Seniority,
}

/// Repository for the `roles` table.
#[derive(Clone)]
pub struct RoleRepository {
    pool: SqlitePool,
}

impl RoleRepository {
    pub async fn insert(&self, role: NewRole<'_>) -> Result<i64, RecordError> {
        let result =
            sqlx::query("INSERT INTO roles (title, department_id, seniority) VALUES (?, ?, ?)")
                .bind(role.title)
                .bind(role.department_id)
                .bind(role.seniority.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }
}

/// Data required to hire an employee.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub user_id: i64,
    pub role_id: i64,
    pub seniority: Seniority,
    pub manager_id: Option<i64>,
    pub salary: i64,
    pub hire_date: NaiveDate,
}

#[derive(Debug, Clone, Copy)]
pub struct NewSalaryChange {
    pub employee_id: i64,
    pub amount: i64,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, Copy)]
pub struct NewRoleChange {
    pub employee_id: i64,
    pub new_role_id: i64,
    pub new_seniority: Seniority,
    pub effective_date: NaiveDate,
}

/// Repository for `employees` and the append-only history tables.
///
/// Every write runs in a transaction so the employee row and its history
/// never disagree.
#[derive(Clone)]
pub struct EmployeeRepository {
    pool: SqlitePool,
}

const EMPLOYEE_SELECT: &str = "SELECT e.id, e.user_id, e.role_id, e.seniority, e.manager_id, \
     e.current_salary, e.hire_date, e.termination_date, \
     u.username, u.first_name, u.last_name \
     FROM employees e JOIN users u ON u.id = e.user_id";

impl EmployeeRepository {
    /// Creates the employee and records the starting salary as the first history entry.
    pub async fn hire(&self, employee: NewEmployee) -> Result<i64, RecordError> {
        if employee.salary <= 0 {
            return Err(ValidationError::NonPositiveSalary(employee.salary).into());
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO employees \
             (user_id, role_id, seniority, manager_id, current_salary, hire_date) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(employee.user_id)
        .bind(employee.role_id)
        .bind(employee.seniority.as_str())
        .bind(employee.manager_id)
        .bind(employee.salary)
        .bind(employee.hire_date)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO salary_history (employee_id, amount, effective_date) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(employee.salary)
        .bind(employee.hire_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    pub async fn fetch(&self, employee_id: i64) -> Result<Option<Employee>, RecordError> {
        let mut conn = self.pool.acquire().await?;
        fetch_employee(&mut conn, employee_id).await
    }

    /// Appends a salary entry and updates the current salary.
    pub async fn record_salary_change(
        &self,
        change: NewSalaryChange,
    ) -> Result<SalaryHistory, RecordError> {
        let mut tx = self.pool.begin().await?;
        let employee = fetch_employee(&mut tx, change.employee_id)
            .await?
            .ok_or(RecordError::EmployeeNotFound(change.employee_id))?;
        let latest = latest_effective_date(&mut tx, HistoryTable::Salary, employee.id).await?;
        validate_salary_change(&employee, change.amount, change.effective_date, latest)?;

        let result = sqlx::query(
            "INSERT INTO salary_history (employee_id, amount, effective_date) VALUES (?, ?, ?)",
        )
        .bind(change.employee_id)
        .bind(change.amount)
        .bind(change.effective_date)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE employees SET current_salary = ? WHERE id = ?")
            .bind(change.amount)
            .bind(change.employee_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(SalaryHistory {
            id: result.last_insert_rowid(),
            employee_id: change.employee_id,
            amount: change.amount,
            effective_date: change.effective_date,
        })
    }

    /// Appends a role change and moves the employee to the new role and seniority.
    pub async fn record_role_change(
        &self,
        change: NewRoleChange,
    ) -> Result<RoleHistory, RecordError> {
        let mut tx = self.pool.begin().await?;
        let employee = fetch_employee(&mut tx, change.employee_id)
            .await?
            .ok_or(RecordError::EmployeeNotFound(change.employee_id))?;

        let role: Option<(i64,)> = sqlx::query_as("SELECT id FROM roles WHERE id = ?")
            .bind(change.new_role_id)
            .fetch_optional(&mut *tx)
            .await?;
        if role.is_none() {
            return Err(RecordError::RoleNotFound(change.new_role_id));
        }

        let latest = latest_effective_date(&mut tx, HistoryTable::Role, employee.id).await?;
        let kind = validate_role_change(
            &employee,
            change.new_role_id,
            change.new_seniority,
            change.effective_date,
            latest,
        )?;

        let result = sqlx::query(
            "INSERT INTO role_history \
             (employee_id, old_role_id, new_role_id, old_seniority, new_seniority, effective_date, kind) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(employee.id)
        .bind(employee.role_id)
        .bind(change.new_role_id)
        .bind(employee.seniority.as_str())
        .bind(change.new_seniority.as_str())
        .bind(change.effective_date)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE employees SET role_id = ?, seniority = ? WHERE id = ?")
            .bind(change.new_role_id)
            .bind(change.new_seniority.as_str())
            .bind(employee.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(RoleHistory {
            id: result.last_insert_rowid(),
            employee_id: employee.id,
            old_role_id: employee.role_id,
            new_role_id: change.new_role_id,
            old_seniority: employee.seniority,
            new_seniority: change.new_seniority,
            effective_date: change.effective_date,
            kind,
        })
    }

    /// Points the employee at a new manager, refusing cycles.
    pub async fn assign_manager(
        &self,
        employee_id: i64,
        manager_id: i64,
    ) -> Result<(), RecordError> {
        let mut tx = self.pool.begin().await?;
        let chain: HashMap<i64, Option<i64>> =
            sqlx::query_as::<_, (i64, Option<i64>)>("SELECT id, manager_id FROM employees")
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();

        if !chain.contains_key(&employee_id) {
            return Err(RecordError::EmployeeNotFound(employee_id));
        }
        if !chain.contains_key(&manager_id) {
            return Err(RecordError::EmployeeNotFound(manager_id));
        }
        validate_manager_assignment(employee_id, manager_id, |id| {
            chain.get(&id).copied().flatten()
        })?;

        sqlx::query("UPDATE employees SET manager_id = ? WHERE id = ?")
            .bind(manager_id)
            .bind(employee_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Soft-deactivates the employee. History rows are kept.
    pub async fn terminate(
        &self,
        employee_id: i64,
        termination_date: NaiveDate,
    ) -> Result<(), RecordError> {
        let mut tx = self.pool.begin().await?;
        let employee = fetch_employee(&mut tx, employee_id)
            .await?
            .ok_or(RecordError::EmployeeNotFound(employee_id))?;
        validate_termination(&employee, termination_date)?;

        sqlx::query("UPDATE employees SET termination_date = ? WHERE id = ?")
            .bind(termination_date)
            .bind(employee_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn fetch_employee(
    conn: &mut SqliteConnection,
    employee_id: i64,
) -> Result<Option<Employee>, RecordError> {
    let row = sqlx::query_as::<_, EmployeeRow>(&format!("{EMPLOYEE_SELECT} WHERE e.id = ?"))
        .bind(employee_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(EmployeeRow::into_domain).transpose()?)
}

#[derive(Debug, Clone, Copy)]
enum HistoryTable {
    Salary,
    Role,
}

/// Effective date of the newest history row for an employee.
async fn latest_effective_date(
    conn: &mut SqliteConnection,
    table: HistoryTable,
    employee_id: i64,
) -> Result<Option<NaiveDate>, RecordError> {
    let sql = match table {
        HistoryTable::Salary => {
            "SELECT effective_date FROM salary_history WHERE employee_id = ? \
             ORDER BY effective_date DESC, id DESC LIMIT 1"
        }
        HistoryTable::Role => {
            "SELECT effective_date FROM role_history WHERE employee_id = ? \
             ORDER BY effective_date DESC, id DESC LIMIT 1"
        }
    };
    let row: Option<(NaiveDate,)> = sqlx::query_as(sql)
        .bind(employee_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|(date,)| date))
}

/// Repository that reads every table into a [`Dataset`].
#[derive(Clone)]
pub struct SnapshotRepository {
    pool: SqlitePool,
}

impl SnapshotRepository {
    /// Loads all records inside one read transaction so the snapshot is consistent.
    pub async fn load(&self) -> Result<Dataset, StorageError> {
        let mut tx = self.pool.begin().await?;

        let departments = sqlx::query_as::<_, DepartmentRow>(
            "SELECT id, name, description, budget, manager_id FROM departments ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(DepartmentRow::into_domain)
        .collect();

        let roles = sqlx::query_as::<_, RoleRow>(
            "SELECT id, title, department_id, seniority FROM roles ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(RoleRow::into_domain)
        .collect::<Result<Vec<_>, _>>()?;

        let employees = sqlx::query_as::<_, EmployeeRow>(&format!("{EMPLOYEE_SELECT} ORDER BY e.id"))
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(EmployeeRow::into_domain)
            .collect::<Result<Vec<_>, _>>()?;

        let salary_history = sqlx::query_as::<_, SalaryRow>(
            "SELECT id, employee_id, amount, effective_date FROM salary_history \
             ORDER BY effective_date, id",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(SalaryRow::into_domain)
        .collect();

        let role_history = sqlx::query_as::<_, RoleHistoryRow>(
            "SELECT id, employee_id, old_role_id, new_role_id, old_seniority, new_seniority, \
             effective_date, kind FROM role_history ORDER BY effective_date, id",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(RoleHistoryRow::into_domain)
        .collect::<Result<Vec<_>, _>>()?;

        let mut memberships: HashMap<i64, Vec<String>> = HashMap::new();
        let membership_rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT ug.user_id, g.name FROM user_groups ug \
             JOIN groups g ON g.id = ug.group_id ORDER BY g.name",
        )
        .fetch_all(&mut *tx)
        .await?;
        for (user_id, name) in membership_rows {
            memberships.entry(user_id).or_default().push(name);
        }

        let users = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, first_name, last_name, email, is_superuser, date_joined \
             FROM users ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|row| {
            let groups = memberships.remove(&row.id).unwrap_or_default();
            row.into_domain(groups)
        })
        .collect();

        let groups = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM groups ORDER BY name")
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|(id, name)| Group { id, name })
            .collect();

        tx.commit().await?;

        Ok(Dataset::from(Records {
            departments,
            roles,
            employees,
            salary_history,
            role_history,
            users,
            groups,
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DepartmentRow {
    id: i64,
    name: String,
    description: String,
    budget: Option<i64>,
    manager_id: Option<i64>,
}

impl DepartmentRow {
    fn into_domain(self) -> Department {
        Department {
            id: self.id,
            name: self.name,
            description: self.description,
            budget: self.budget,
            manager_id: self.manager_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RoleRow {
    id: i64,
    title: String,
    department_id: i64,
    seniority: String,
}

impl RoleRow {
    fn into_domain(self) -> Result<Role, ValidationError> {
        Ok(Role {
            id: self.id,
            title: self.title,
            department_id: self.department_id,
            seniority: self.seniority.parse()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    id: i64,
    user_id: i64,
    role_id: i64,
    seniority: String,
    manager_id: Option<i64>,
    current_salary: i64,
    hire_date: NaiveDate,
    termination_date: Option<NaiveDate>,
    username: String,
    first_name: String,
    last_name: String,
}

impl EmployeeRow {
    fn into_domain(self) -> Result<Employee, ValidationError> {
        let name = format!("{} {}", self.first_name, self.last_name);
        let full_name = match name.trim() {
            "" => self.username,
            trimmed => trimmed.to_string(),
        };
        Ok(Employee {
            id: self.id,
            user_id: self.user_id,
            full_name,
            role_id: self.role_id,
            seniority: self.seniority.parse()?,
            manager_id: self.manager_id,
            current_salary: self.current_salary,
            hire_date: self.hire_date,
            termination_date: self.termination_date,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SalaryRow {
    id: i64,
    employee_id: i64,
    amount: i64,
    effective_date: NaiveDate,
}

impl SalaryRow {
    fn into_domain(self) -> SalaryHistory {
        SalaryHistory {
            id: self.id,
            employee_id: self.employee_id,
            amount: self.amount,
            effective_date: self.effective_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RoleHistoryRow {
    id: i64,
    employee_id: i64,
    old_role_id: i64,
    new_role_id: i64,
    old_seniority: String,
    new_seniority: String,
    effective_date: NaiveDate,
    kind: String,
}

impl RoleHistoryRow {
    fn into_domain(self) -> Result<RoleHistory, ValidationError> {
        Ok(RoleHistory {
            id: self.id,
            employee_id: self.employee_id,
            old_role_id: self.old_role_id,
            new_role_id: self.new_role_id,
            old_seniority: self.old_seniority.parse()?,
            new_seniority: self.new_seniority.parse()?,
            effective_date: self.effective_date,
            kind: RoleChangeKind::from_str(&self.kind)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    is_superuser: i64,
    date_joined: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self, groups: Vec<String>) -> User {
        User {
            id: self.id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            is_superuser: self.is_superuser != 0,
            date_joined: self.date_joined,
            groups,
        }
    }
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn joined() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    struct Seeded {
        db: Database,
        engineering_junior: i64,
        engineering_senior: i64,
        sales_junior: i64,
        lead: i64,
        report: i64,
    }

    async fn setup_db() -> Database {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        db.run_migrations().await.expect("migrations");
        db
    }

    async fn user(db: &Database, username: &str, first_name: &str) -> i64 {
        db.users()
            .insert(NewUser {
                username,
                first_name,
                last_name: "",
                email: "",
                is_superuser: false,
                date_joined: joined(),
            })
            .await
            .expect("insert user")
    }

    async fn seed() -> Seeded {
        let db = setup_db().await;
        let engineering = db
            .departments()
            .insert(NewDepartment {
                name: "Engineering",
                description: "Builds things",
                budget: Some(500_000),
            })
            .await
            .expect("department");
        let sales = db
            .departments()
            .insert(NewDepartment {
                name: "Sales",
                description: "",
                budget: None,
            })
            .await
            .expect("department");
        let role = |title: &'static str, department_id, seniority| NewRole {
            title,
            department_id,
            seniority,
        };
        let engineering_junior = db
            .roles()
            .insert(role("Developer", engineering, Seniority::Junior))
            .await
            .expect("role");
        let engineering_senior = db
            .roles()
            .insert(role("Senior Developer", engineering, Seniority::Senior))
            .await
            .expect("role");
        let sales_junior = db
            .roles()
            .insert(role("Account Executive", sales, Seniority::Junior))
            .await
            .expect("role");

        let lead_user = user(&db, "lead", "Lena").await;
        let report_user = user(&db, "report", "").await;

        let lead = db
            .employees()
            .hire(NewEmployee {
                user_id: lead_user,
                role_id: engineering_senior,
                seniority: Seniority::Senior,
                manager_id: None,
                salary: 90_000,
                hire_date: date(2020, 1, 1),
            })
            .await
            .expect("hire lead");
        let report = db
            .employees()
            .hire(NewEmployee {
                user_id: report_user,
                role_id: engineering_junior,
                seniority: Seniority::Junior,
                manager_id: Some(lead),
                salary: 50_000,
                hire_date: date(2023, 1, 1),
            })
            .await
            .expect("hire report");

        Seeded {
            db,
            engineering_junior,
            engineering_senior,
            sales_junior,
            lead,
            report,
        }
    }

    #[tokio::test]
    async fn migrations_apply() {
        let db = setup_db().await;
        let tables: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(db.pool())
                .await
                .expect("fetch tables");
        assert!(tables.0 >= 8, "expected record tables to be created");
    }

    #[tokio::test]
    async fn hire_records_starting_salary_and_names() {
        let seeded = seed().await;
        let dataset = seeded.db.snapshots().load().await.expect("load");

        let lead = dataset.employee(seeded.lead).expect("lead");
        assert_eq!(lead.full_name, "Lena");
        let report = dataset.employee(seeded.report).expect("report");
        assert_eq!(report.full_name, "report");
        assert_eq!(report.manager_id, Some(seeded.lead));

        let timeline = dataset.salary_timeline(seeded.report);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].amount, 50_000);
        assert_eq!(timeline[0].effective_date, date(2023, 1, 1));
    }

    #[tokio::test]
    async fn salary_change_appends_and_updates_current() {
        let seeded = seed().await;
        let repo = seeded.db.employees();
        let entry = repo
            .record_salary_change(NewSalaryChange {
                employee_id: seeded.report,
                amount: 55_000,
                effective_date: date(2024, 1, 1),
            })
            .await
            .expect("raise");
        assert_eq!(entry.amount, 55_000);

        let employee = repo.fetch(seeded.report).await.expect("fetch").expect("exists");
        assert_eq!(employee.current_salary, 55_000);

        let dataset = seeded.db.snapshots().load().await.expect("load");
        assert_eq!(dataset.previous_amount(&entry), Some(50_000));
    }

    #[tokio::test]
    async fn salary_change_is_validated() {
        let seeded = seed().await;
        let repo = seeded.db.employees();

        let unchanged = repo
            .record_salary_change(NewSalaryChange {
                employee_id: seeded.report,
                amount: 50_000,
                effective_date: date(2024, 1, 1),
            })
            .await;
        assert!(matches!(
            unchanged,
            Err(RecordError::Invalid(ValidationError::UnchangedSalary(50_000)))
        ));

        let early = repo
            .record_salary_change(NewSalaryChange {
                employee_id: seeded.report,
                amount: 60_000,
                effective_date: date(2022, 6, 1),
            })
            .await;
        assert!(matches!(
            early,
            Err(RecordError::Invalid(ValidationError::BeforeHireDate { .. }))
        ));

        let missing = repo
            .record_salary_change(NewSalaryChange {
                employee_id: 999,
                amount: 60_000,
                effective_date: date(2024, 1, 1),
            })
            .await;
        assert!(matches!(missing, Err(RecordError::EmployeeNotFound(999))));

        let dataset = seeded.db.snapshots().load().await.expect("load");
        assert_eq!(dataset.salary_timeline(seeded.report).len(), 1);
    }

    #[tokio::test]
    async fn role_change_is_classified_and_applied() {
        let seeded = seed().await;
        let repo = seeded.db.employees();

        let promotion = repo
            .record_role_change(NewRoleChange {
                employee_id: seeded.report,
                new_role_id: seeded.engineering_senior,
                new_seniority: Seniority::Senior,
                effective_date: date(2024, 6, 1),
            })
            .await
            .expect("promotion");
        assert_eq!(promotion.kind, RoleChangeKind::Promotion);
        assert_eq!(promotion.old_role_id, seeded.engineering_junior);

        let unknown = repo
            .record_role_change(NewRoleChange {
                employee_id: seeded.report,
                new_role_id: 999,
                new_seniority: Seniority::Senior,
                effective_date: date(2024, 7, 1),
            })
            .await;
        assert!(matches!(unknown, Err(RecordError::RoleNotFound(999))));

        let dataset = seeded.db.snapshots().load().await.expect("load");
        let employee = dataset.employee(seeded.report).expect("report");
        assert_eq!(employee.role_id, seeded.engineering_senior);
        assert_eq!(employee.seniority, Seniority::Senior);
        assert_eq!(
            dataset.role_at(seeded.report, date(2024, 1, 1)),
            Some(seeded.engineering_junior)
        );

        let lateral = repo
            .record_role_change(NewRoleChange {
                employee_id: seeded.report,
                new_role_id: seeded.sales_junior,
                new_seniority: Seniority::Senior,
                effective_date: date(2025, 1, 1),
            })
            .await
            .expect("lateral move");
        assert_eq!(lateral.kind, RoleChangeKind::LateralMove);
    }

    #[tokio::test]
    async fn backdated_changes_leave_current_state_consistent() {
        let seeded = seed().await;
        let repo = seeded.db.employees();

        repo.record_salary_change(NewSalaryChange {
            employee_id: seeded.report,
            amount: 70_000,
            effective_date: date(2025, 1, 1),
        })
        .await
        .expect("raise");
        let backdated_salary = repo
            .record_salary_change(NewSalaryChange {
                employee_id: seeded.report,
                amount: 55_000,
                effective_date: date(2024, 1, 1),
            })
            .await;
        assert!(matches!(
            backdated_salary,
            Err(RecordError::Invalid(ValidationError::BeforeLatestChange { .. }))
        ));

        repo.record_role_change(NewRoleChange {
            employee_id: seeded.report,
            new_role_id: seeded.engineering_senior,
            new_seniority: Seniority::Senior,
            effective_date: date(2025, 6, 1),
        })
        .await
        .expect("promotion");
        let backdated_role = repo
            .record_role_change(NewRoleChange {
                employee_id: seeded.report,
                new_role_id: seeded.sales_junior,
                new_seniority: Seniority::Junior,
                effective_date: date(2024, 6, 1),
            })
            .await;
        assert!(matches!(
            backdated_role,
            Err(RecordError::Invalid(ValidationError::BeforeLatestChange { .. }))
        ));

        let dataset = seeded.db.snapshots().load().await.expect("load");
        let employee = dataset.employee(seeded.report).expect("report");
        let latest = dataset
            .latest_salary_entry(seeded.report)
            .expect("salary history");
        assert_eq!(employee.current_salary, latest.amount);
        assert_eq!(latest.amount, 70_000);
        assert_eq!(employee.role_id, seeded.engineering_senior);
        assert_eq!(
            dataset.role_at(seeded.report, date(2025, 7, 1)),
            Some(seeded.engineering_senior)
        );
        assert_eq!(dataset.salary_timeline(seeded.report).len(), 2);

        repo.record_salary_change(NewSalaryChange {
            employee_id: seeded.report,
            amount: 72_000,
            effective_date: date(2025, 1, 1),
        })
        .await
        .expect("same-day correction follows the latest entry");
    }

    #[tokio::test]
    async fn history_rows_are_append_only() {
        let seeded = seed().await;
        let updated = sqlx::query("UPDATE salary_history SET amount = 1")
            .execute(seeded.db.pool())
            .await;
        assert!(updated.is_err());

        let deleted = sqlx::query("DELETE FROM salary_history")
            .execute(seeded.db.pool())
            .await;
        assert!(matches!(
            deleted.map_err(RecordError::from),
            Err(RecordError::Constraint)
        ));
    }

    #[tokio::test]
    async fn manager_assignment_rejects_cycles() {
        let seeded = seed().await;
        let repo = seeded.db.employees();

        let cycle = repo.assign_manager(seeded.lead, seeded.report).await;
        assert!(matches!(
            cycle,
            Err(RecordError::Invalid(ValidationError::ManagerCycle { .. }))
        ));
        let own = repo.assign_manager(seeded.lead, seeded.lead).await;
        assert!(matches!(
            own,
            Err(RecordError::Invalid(ValidationError::SelfManagement(_)))
        ));
        let missing = repo.assign_manager(seeded.report, 999).await;
        assert!(matches!(missing, Err(RecordError::EmployeeNotFound(999))));
    }

    #[tokio::test]
    async fn termination_is_soft_and_validated() {
        let seeded = seed().await;
        let repo = seeded.db.employees();
        repo.terminate(seeded.report, date(2024, 12, 31))
            .await
            .expect("terminate");

        let again = repo.terminate(seeded.report, date(2025, 1, 31)).await;
        assert!(matches!(
            again,
            Err(RecordError::Invalid(ValidationError::AlreadyTerminated(_)))
        ));

        let dataset = seeded.db.snapshots().load().await.expect("load");
        let employee = dataset.employee(seeded.report).expect("still stored");
        assert_eq!(employee.termination_date, Some(date(2024, 12, 31)));
        assert!(!employee.is_active_on(date(2024, 12, 31)));
        assert_eq!(dataset.salary_timeline(seeded.report).len(), 1);
    }

    #[tokio::test]
    async fn snapshot_carries_users_and_groups() {
        let seeded = seed().await;
        let users = seeded.db.users();
        let admin = user(&seeded.db, "admin", "Ada").await;
        users.add_to_group(admin, "Admin").await.expect("group");
        users.add_to_group(admin, "Admin").await.expect("idempotent");
        users.add_to_group(admin, "HR").await.expect("group");
        users.ensure_group("Auditors").await.expect("group");

        let duplicate = users
            .insert(NewUser {
                username: "admin",
                first_name: "",
                last_name: "",
                email: "",
                is_superuser: false,
                date_joined: joined(),
            })
            .await;
        assert!(matches!(duplicate, Err(RecordError::Conflict)));

        let dataset = seeded.db.snapshots().load().await.expect("load");
        let loaded = dataset.user(admin).expect("admin");
        assert_eq!(loaded.groups, vec!["Admin".to_string(), "HR".to_string()]);
        assert_eq!(loaded.date_joined, joined());
        let names: Vec<&str> = dataset.groups().iter().map(|group| group.name.as_str()).collect();
        assert_eq!(names, vec!["Admin", "Auditors", "HR"]);
        assert!(dataset.employee_for_user(admin).is_none());
    }

    #[tokio::test]
    async fn file_backed_database_persists_between_pools() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("hr.db").display());

        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");
        db.departments()
            .insert(NewDepartment {
                name: "Finance",
                description: "",
                budget: Some(1),
            })
            .await
            .expect("department");
        db.pool().close().await;

        let reopened = Database::connect(&url).await.expect("reconnect");
        reopened.run_migrations().await.expect("idempotent migrations");
        let dataset = reopened.snapshots().load().await.expect("load");
        assert_eq!(dataset.departments().len(), 1);
        assert_eq!(dataset.departments()[0].name, "Finance");
    }
}
