//! Chainable query builders over a [`Dataset`].
//!
//! Every builder method consumes the builder and returns a narrowed
//! copy; nothing is evaluated until a terminal call (`materialize`,
//! `changes`, or one of the aggregations). Filters are pure predicates, so
//! they compose in any order.

use chrono::{Months, NaiveDate};

use crate::aggregate::{
    self, MonthlyRoleStats, MonthlySalaryStats, RoleGrowth, SalaryChange, SalaryIncrease,
};
use crate::error::ValidationError;
use crate::types::{Dataset, Employee, RoleChangeKind, RoleHistory, SalaryHistory, Seniority};

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 9999;

/// Inclusive effective-date span. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateSpan {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateSpan {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }

    fn intersect(self, other: Self) -> Self {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { start, end }
    }
}

/// Returns the span covering the whole calendar year.
pub fn year_span(year: i32) -> Result<DateSpan, ValidationError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ValidationError::InvalidYear(year));
    }
    let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(ValidationError::InvalidYear(year))?;
    let end = NaiveDate::from_ymd_opt(year, 12, 31).ok_or(ValidationError::InvalidYear(year))?;
    Ok(DateSpan {
        start: Some(start),
        end: Some(end),
    })
}

/// Returns the span covering one calendar month.
pub fn month_span(year: i32, month: u32) -> Result<DateSpan, ValidationError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ValidationError::InvalidYear(year));
    }
    if !(1..=12).contains(&month) {
        return Err(ValidationError::InvalidMonth(month));
    }
    let start =
        NaiveDate::from_ymd_opt(year, month, 1).ok_or(ValidationError::InvalidMonth(month))?;
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or(ValidationError::InvalidYear(year))?;
    Ok(DateSpan {
        start: Some(start),
        end: Some(end),
    })
}

/// Cutoff date for the staleness lookback: entries strictly before it are stale.
pub fn stale_cutoff(months: u32, as_of: NaiveDate) -> Result<NaiveDate, ValidationError> {
    if months == 0 {
        return Err(ValidationError::InvalidLookbackMonths(0));
    }
    as_of
        .checked_sub_months(Months::new(months))
        .ok_or(ValidationError::InvalidLookbackMonths(i64::from(months)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Year(i32),
    Month(i32, u32),
    Range(Option<NaiveDate>, Option<NaiveDate>),
}

impl Window {
    fn resolve(self) -> Result<DateSpan, ValidationError> {
        match self {
            Self::Year(year) => year_span(year),
            Self::Month(year, month) => month_span(year, month),
            Self::Range(start, end) => {
                if let (Some(start), Some(end)) = (start, end) {
                    if start > end {
                        return Err(ValidationError::InvertedRange { start, end });
                    }
                }
                Ok(DateSpan { start, end })
            }
        }
    }
}

fn resolve_span(windows: &[Window]) -> Result<DateSpan, ValidationError> {
    windows
        .iter()
        .try_fold(DateSpan::default(), |span, window| {
            Ok(span.intersect(window.resolve()?))
        })
}

/// Query builder over employees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeQuery {
    filters: Vec<EmployeeFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmployeeFilter {
    Active(NaiveDate),
    Department(i64),
    Seniority(Seniority),
    ReportsTo(i64),
    HiredSince(NaiveDate),
    WithoutRecentRaise { months: u32, as_of: NaiveDate },
}

impl EmployeeFilter {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::WithoutRecentRaise { months, as_of } => stale_cutoff(*months, *as_of).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn matches(&self, dataset: &Dataset, employee: &Employee) -> bool {
        match self {
            Self::Active(as_of) => employee.is_active_on(*as_of),
            Self::Department(department_id) => dataset
                .role(employee.role_id)
                .is_some_and(|role| role.department_id == *department_id),
            Self::Seniority(seniority) => employee.seniority == *seniority,
            Self::ReportsTo(manager_id) => employee.manager_id == Some(*manager_id),
            Self::HiredSince(date) => employee.hire_date >= *date,
            Self::WithoutRecentRaise { months, as_of } => {
                let Ok(cutoff) = stale_cutoff(*months, *as_of) else {
                    return false;
                };
                dataset
                    .latest_salary_entry(employee.id)
                    .map_or(true, |entry| entry.effective_date < cutoff)
            }
        }
    }
}

impl EmployeeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, filter: EmployeeFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Employees without a termination date at or before `as_of`.
    pub fn active(self, as_of: NaiveDate) -> Self {
        self.with(EmployeeFilter::Active(as_of))
    }

    pub fn by_department(self, department_id: i64) -> Self {
        self.with(EmployeeFilter::Department(department_id))
    }

    pub fn by_seniority(self, seniority: Seniority) -> Self {
        self.with(EmployeeFilter::Seniority(seniority))
    }

    pub fn reports_to(self, manager_id: i64) -> Self {
        self.with(EmployeeFilter::ReportsTo(manager_id))
    }

    pub fn hired_since(self, date: NaiveDate) -> Self {
        self.with(EmployeeFilter::HiredSince(date))
    }

    /// Employees whose latest salary entry is older than `months` months
    /// before `as_of`, including employees with no salary history at all.
    pub fn without_recent_raise(self, months: u32, as_of: NaiveDate) -> Self {
        self.with(EmployeeFilter::WithoutRecentRaise { months, as_of })
    }

    pub fn materialize<'a>(
        &self,
        dataset: &'a Dataset,
    ) -> Result<Vec<&'a Employee>, ValidationError> {
        for filter in &self.filters {
            filter.validate()?;
        }
        Ok(dataset
            .employees()
            .iter()
            .filter(|employee| {
                self.filters
                    .iter()
                    .all(|filter| filter.matches(dataset, employee))
            })
            .collect())
    }

    pub fn count(&self, dataset: &Dataset) -> Result<usize, ValidationError> {
        self.materialize(dataset).map(|employees| employees.len())
    }
}

/// Query builder over salary history rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalaryHistoryQuery {
    windows: Vec<Window>,
    filters: Vec<SalaryFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SalaryFilter {
    Employee(i64),
    ActiveEmployees(NaiveDate),
    Raises,
    Decreases,
}

impl SalaryFilter {
    fn matches(&self, dataset: &Dataset, entry: &SalaryHistory) -> bool {
        match self {
            Self::Employee(employee_id) => entry.employee_id == *employee_id,
            Self::ActiveEmployees(as_of) => dataset
                .employee(entry.employee_id)
                .is_some_and(|employee| employee.is_active_on(*as_of)),
            Self::Raises => dataset
                .previous_amount(entry)
                .is_some_and(|previous| entry.amount > previous),
            Self::Decreases => dataset
                .previous_amount(entry)
                .is_some_and(|previous| entry.amount < previous),
        }
    }
}

impl SalaryHistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, filter: SalaryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    fn within(mut self, window: Window) -> Self {
        self.windows.push(window);
        self
    }

    pub fn by_year(self, year: i32) -> Self {
        self.within(Window::Year(year))
    }

    pub fn by_month(self, year: i32, month: u32) -> Self {
        self.within(Window::Month(year, month))
    }

    pub fn by_date_range(self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.within(Window::Range(start, end))
    }

    pub fn for_employee(self, employee_id: i64) -> Self {
        self.with(SalaryFilter::Employee(employee_id))
    }

    /// Rows whose subject employee is active on `as_of`.
    pub fn active(self, as_of: NaiveDate) -> Self {
        self.with(SalaryFilter::ActiveEmployees(as_of))
    }

    pub fn raises_only(self) -> Self {
        self.with(SalaryFilter::Raises)
    }

    pub fn decreases_only(self) -> Self {
        self.with(SalaryFilter::Decreases)
    }

    /// Effective-date window after intersecting every window constraint.
    pub fn span(&self) -> Result<DateSpan, ValidationError> {
        resolve_span(&self.windows)
    }

    pub fn materialize<'a>(
        &self,
        dataset: &'a Dataset,
    ) -> Result<Vec<&'a SalaryHistory>, ValidationError> {
        let span = self.span()?;
        Ok(dataset
            .salary_history()
            .iter()
            .filter(|entry| span.contains(entry.effective_date))
            .filter(|entry| {
                self.filters
                    .iter()
                    .all(|filter| filter.matches(dataset, entry))
            })
            .collect())
    }

    /// Materializes the rows annotated with their change against the previous entry.
    pub fn changes(&self, dataset: &Dataset) -> Result<Vec<SalaryChange>, ValidationError> {
        Ok(self
            .materialize(dataset)?
            .into_iter()
            .map(|entry| SalaryChange::annotate(dataset, entry))
            .collect())
    }

    /// Largest increases over the query's window, see [`aggregate::top_increases`].
    pub fn top_increases(
        &self,
        dataset: &Dataset,
        limit: usize,
    ) -> Result<Vec<SalaryIncrease>, ValidationError> {
        if limit == 0 {
            return Err(ValidationError::InvalidLimit(0));
        }
        let span = self.span()?;
        let rows = self.materialize(dataset)?;
        Ok(aggregate::top_increases(dataset, &rows, span, limit))
    }

    /// Dense per-month statistics for `year`.
    pub fn monthly_stats(
        &self,
        dataset: &Dataset,
        year: i32,
    ) -> Result<Vec<MonthlySalaryStats>, ValidationError> {
        let changes = self.clone().by_year(year).changes(dataset)?;
        Ok(aggregate::monthly_salary_stats(&changes))
    }

    pub fn avg_growth_by_role(&self, dataset: &Dataset) -> Result<Vec<RoleGrowth>, ValidationError> {
        let rows = self.materialize(dataset)?;
        Ok(aggregate::avg_growth_by_role(dataset, &rows))
    }
}

/// Query builder over role history rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleHistoryQuery {
    windows: Vec<Window>,
    filters: Vec<RoleFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleFilter {
    Kind(RoleChangeKind),
    Employee(i64),
    ChangedDepartment,
}

impl RoleFilter {
    fn matches(&self, dataset: &Dataset, entry: &RoleHistory) -> bool {
        match self {
            Self::Kind(RoleChangeKind::LateralMove) => {
                entry.kind == RoleChangeKind::LateralMove && entry.old_role_id != entry.new_role_id
            }
            Self::Kind(kind) => entry.kind == *kind,
            Self::Employee(employee_id) => entry.employee_id == *employee_id,
            Self::ChangedDepartment => {
                match (dataset.role(entry.old_role_id), dataset.role(entry.new_role_id)) {
                    (Some(old), Some(new)) => old.department_id != new.department_id,
                    _ => false,
                }
            }
        }
    }
}

impl RoleHistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, filter: RoleFilter) -> Self {
        self.filters.push(filter);
        self
    }

    fn within(mut self, window: Window) -> Self {
        self.windows.push(window);
        self
    }

    pub fn promotions_only(self) -> Self {
        self.with(RoleFilter::Kind(RoleChangeKind::Promotion))
    }

    /// Same seniority band, different role.
    pub fn lateral_moves_only(self) -> Self {
        self.with(RoleFilter::Kind(RoleChangeKind::LateralMove))
    }

    pub fn demotions_only(self) -> Self {
        self.with(RoleFilter::Kind(RoleChangeKind::Demotion))
    }

    pub fn for_employee(self, employee_id: i64) -> Self {
        self.with(RoleFilter::Employee(employee_id))
    }

    /// Moves whose old and new roles belong to different departments.
    pub fn changed_department(self) -> Self {
        self.with(RoleFilter::ChangedDepartment)
    }

    pub fn by_year(self, year: i32) -> Self {
        self.within(Window::Year(year))
    }

    pub fn by_month(self, year: i32, month: u32) -> Self {
        self.within(Window::Month(year, month))
    }

    pub fn by_date_range(self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.within(Window::Range(start, end))
    }

    pub fn span(&self) -> Result<DateSpan, ValidationError> {
        resolve_span(&self.windows)
    }

    pub fn materialize<'a>(
        &self,
        dataset: &'a Dataset,
    ) -> Result<Vec<&'a RoleHistory>, ValidationError> {
        let span = self.span()?;
        Ok(dataset
            .role_history()
            .iter()
            .filter(|entry| span.contains(entry.effective_date))
            .filter(|entry| {
                self.filters
                    .iter()
                    .all(|filter| filter.matches(dataset, entry))
            })
            .collect())
    }

    /// Dense per-month change and promotion counts for `year`.
    pub fn monthly_stats(
        &self,
        dataset: &Dataset,
        year: i32,
    ) -> Result<Vec<MonthlyRoleStats>, ValidationError> {
        let rows = self.clone().by_year(year).materialize(dataset)?;
        Ok(aggregate::monthly_role_stats(&rows))
    }
}
