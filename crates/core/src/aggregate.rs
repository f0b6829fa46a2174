use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::query::DateSpan;
use crate::types::{Dataset, RoleChangeKind, RoleHistory, SalaryHistory};

/// Percentage change from `base` to `value`; `None` for a zero base.
pub fn percentage_change(base: i64, value: i64) -> Option<f64> {
    if base == 0 {
        return None;
    }
    Some((value - base) as f64 / base as f64 * 100.0)
}

/// Salary row annotated with its change against the previous entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryChange {
    pub id: i64,
    pub employee_id: i64,
    pub effective_date: NaiveDate,
    pub amount: i64,
    pub previous_amount: Option<i64>,
    pub change_amount: Option<i64>,
    pub change_percentage: Option<f64>,
}

impl SalaryChange {
    pub fn annotate(dataset: &Dataset, entry: &SalaryHistory) -> Self {
        let previous_amount = dataset.previous_amount(entry);
        Self {
            id: entry.id,
            employee_id: entry.employee_id,
            effective_date: entry.effective_date,
            amount: entry.amount,
            previous_amount,
            change_amount: previous_amount.map(|previous| entry.amount - previous),
            change_percentage: previous_amount
                .and_then(|previous| percentage_change(previous, entry.amount)),
        }
    }

    pub fn is_raise(&self) -> bool {
        self.change_amount.is_some_and(|delta| delta > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryIncrease {
    pub employee_id: i64,
    pub employee_name: String,
    pub hire_date: NaiveDate,
    pub baseline_amount: i64,
    pub baseline_date: NaiveDate,
    pub latest_amount: i64,
    pub latest_date: NaiveDate,
    pub delta: i64,
    pub change_percentage: Option<f64>,
}

/// Ranks employees by salary increase over `span`.
///
/// For each employee owning a row in `rows`, the delta is the last entry
/// inside the span minus the baseline: the latest entry effective at or
/// before the span start, or the earliest entry inside the span when the
/// span is open or nothing precedes it. Only positive deltas are kept.
/// Ordering is delta descending, then hire date, then employee id.
pub fn top_increases(
    dataset: &Dataset,
    rows: &[&SalaryHistory],
    span: DateSpan,
    limit: usize,
) -> Vec<SalaryIncrease> {
    let candidates: BTreeSet<i64> = rows.iter().map(|entry| entry.employee_id).collect();
    let mut increases = Vec::new();

    for employee_id in candidates {
        let Some(employee) = dataset.employee(employee_id) else {
            continue;
        };
        let timeline = dataset.salary_timeline(employee_id);
        let Some(latest) = timeline
            .iter()
            .copied()
            .rev()
            .find(|entry| span.contains(entry.effective_date))
        else {
            continue;
        };
        let baseline = span
            .start
            .and_then(|start| {
                timeline
                    .iter()
                    .copied()
                    .rev()
                    .find(|entry| entry.effective_date <= start)
            })
            .or_else(|| {
                timeline
                    .iter()
                    .copied()
                    .find(|entry| span.contains(entry.effective_date))
            });
        let Some(baseline) = baseline else {
            continue;
        };
        if baseline.id == latest.id {
            continue;
        }

        let delta = latest.amount - baseline.amount;
        if delta <= 0 {
            continue;
        }

        increases.push(SalaryIncrease {
            employee_id,
            employee_name: employee.full_name.clone(),
            hire_date: employee.hire_date,
            baseline_amount: baseline.amount,
            baseline_date: baseline.effective_date,
            latest_amount: latest.amount,
            latest_date: latest.effective_date,
            delta,
            change_percentage: percentage_change(baseline.amount, latest.amount),
        });
    }

    increases.sort_by(|a, b| {
        b.delta
            .cmp(&a.delta)
            .then_with(|| a.hire_date.cmp(&b.hire_date))
            .then_with(|| a.employee_id.cmp(&b.employee_id))
    });
    increases.truncate(limit);
    increases
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySalaryStats {
    pub month: u32,
    pub count: u64,
    pub total_delta: i64,
    pub average_delta: Option<f64>,
}

/// Buckets changes by calendar month into a dense 12-entry sequence.
///
/// Callers restrict `changes` to a single year. Entries without a previous
/// amount are counted but contribute no delta.
pub fn monthly_salary_stats(changes: &[SalaryChange]) -> Vec<MonthlySalaryStats> {
    let mut counts = [0u64; 12];
    let mut totals = [0i64; 12];
    let mut with_delta = [0u64; 12];

    for change in changes {
        let slot = change.effective_date.month0() as usize;
        counts[slot] += 1;
        if let Some(delta) = change.change_amount {
            totals[slot] += delta;
            with_delta[slot] += 1;
        }
    }

    (0..12)
        .map(|slot| MonthlySalaryStats {
            month: slot as u32 + 1,
            count: counts[slot],
            total_delta: totals[slot],
            average_delta: (with_delta[slot] > 0)
                .then(|| totals[slot] as f64 / with_delta[slot] as f64),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleGrowth {
    pub role_id: i64,
    pub role_title: String,
    pub department_id: Option<i64>,
    pub members: usize,
    pub total_changes: usize,
    pub average_growth_percentage: f64,
}

#[derive(Debug, Clone, Copy)]
struct GrowthSpan {
    earliest: i64,
    latest: i64,
}

/// Average salary growth per role held at the time of each entry.
///
/// A member's growth is (latest - earliest) / earliest over their entries in
/// the group. Members with a zero earliest amount are left out, and groups
/// left without members are dropped.
pub fn avg_growth_by_role(dataset: &Dataset, rows: &[&SalaryHistory]) -> Vec<RoleGrowth> {
    let mut groups: BTreeMap<i64, (BTreeMap<i64, GrowthSpan>, usize)> = BTreeMap::new();

    for entry in rows {
        let Some(role_id) = dataset.role_at(entry.employee_id, entry.effective_date) else {
            continue;
        };
        let (members, changes) = groups.entry(role_id).or_default();
        *changes += 1;
        members
            .entry(entry.employee_id)
            .and_modify(|span| span.latest = entry.amount)
            .or_insert(GrowthSpan {
                earliest: entry.amount,
                latest: entry.amount,
            });
    }

    let mut growth: Vec<RoleGrowth> = groups
        .into_iter()
        .filter_map(|(role_id, (members, total_changes))| {
            let rates: Vec<f64> = members
                .values()
                .filter_map(|span| percentage_change(span.earliest, span.latest))
                .collect();
            if rates.is_empty() {
                return None;
            }
            let role = dataset.role(role_id);
            Some(RoleGrowth {
                role_id,
                role_title: role
                    .map(|role| role.title.clone())
                    .unwrap_or_else(|| format!("role #{role_id}")),
                department_id: role.map(|role| role.department_id),
                members: rates.len(),
                total_changes,
                average_growth_percentage: rates.iter().sum::<f64>() / rates.len() as f64,
            })
        })
        .collect();

    growth.sort_by(|a, b| {
        b.average_growth_percentage
            .total_cmp(&a.average_growth_percentage)
            .then_with(|| a.role_title.cmp(&b.role_title))
    });
    growth
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRoleStats {
    pub month: u32,
    pub total_changes: u64,
    pub promotions: u64,
}

/// Dense 12-month role change counts. Callers restrict `rows` to one year.
pub fn monthly_role_stats(rows: &[&RoleHistory]) -> Vec<MonthlyRoleStats> {
    let mut stats: Vec<MonthlyRoleStats> = (1..=12)
        .map(|month| MonthlyRoleStats {
            month,
            total_changes: 0,
            promotions: 0,
        })
        .collect();

    for entry in rows {
        let bucket = &mut stats[entry.effective_date.month0() as usize];
        bucket.total_changes += 1;
        if entry.kind == RoleChangeKind::Promotion {
            bucket.promotions += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::query::{RoleHistoryQuery, SalaryHistoryQuery};
    use crate::types::fixtures::*;
    use crate::types::{Records, Seniority};

    fn scenario() -> Dataset {
        Dataset::from(Records {
            roles: vec![role(1, "Developer", 1, Seniority::Junior)],
            employees: vec![employee(1, 1, date(2023, 1, 1))],
            salary_history: vec![
                salary(1, 1, 50_000, date(2023, 1, 1)),
                salary(2, 1, 55_000, date(2024, 1, 1)),
                salary(3, 1, 60_000, date(2025, 1, 1)),
            ],
            ..Records::default()
        })
    }

    #[test]
    fn top_increase_over_period_uses_baseline_at_period_start() {
        let dataset = scenario();
        let top = SalaryHistoryQuery::new()
            .by_date_range(Some(date(2024, 1, 1)), Some(date(2025, 12, 31)))
            .top_increases(&dataset, 1)
            .unwrap();

        assert_eq!(top.len(), 1);
        assert_eq!(top[0].employee_id, 1);
        assert_eq!(top[0].delta, 5_000);
        assert_eq!(top[0].baseline_amount, 55_000);
        assert_eq!(top[0].latest_amount, 60_000);
    }

    #[test]
    fn top_increases_without_window_spans_whole_history() {
        let dataset = scenario();
        let top = SalaryHistoryQuery::new().top_increases(&dataset, 5).unwrap();
        assert_eq!(top[0].delta, 10_000);
        assert_eq!(top[0].change_percentage, Some(20.0));
    }

    #[test]
    fn top_increases_ranks_descending_and_breaks_ties_by_hire_date() {
        let dataset = Dataset::from(Records {
            roles: vec![role(1, "Developer", 1, Seniority::Junior)],
            employees: vec![
                employee(1, 1, date(2022, 1, 1)),
                employee(2, 1, date(2020, 1, 1)),
                employee(3, 1, date(2021, 1, 1)),
                employee(4, 1, date(2021, 1, 1)),
                employee(5, 1, date(2019, 1, 1)),
            ],
            salary_history: vec![
                salary(1, 1, 40_000, date(2023, 1, 1)),
                salary(2, 1, 45_000, date(2024, 3, 1)),
                salary(3, 2, 40_000, date(2023, 1, 1)),
                salary(4, 2, 45_000, date(2024, 4, 1)),
                salary(5, 3, 40_000, date(2023, 1, 1)),
                salary(6, 3, 48_000, date(2024, 5, 1)),
                salary(7, 4, 40_000, date(2023, 1, 1)),
                salary(8, 4, 45_000, date(2024, 6, 1)),
                salary(9, 5, 40_000, date(2023, 1, 1)),
                salary(10, 5, 38_000, date(2024, 6, 1)),
            ],
            ..Records::default()
        });

        let top = SalaryHistoryQuery::new()
            .by_year(2024)
            .top_increases(&dataset, 3)
            .unwrap();

        let order: Vec<(i64, i64)> = top.iter().map(|row| (row.employee_id, row.delta)).collect();
        assert_eq!(order, vec![(3, 8_000), (2, 5_000), (4, 5_000)]);
        assert!(top.windows(2).all(|pair| pair[0].delta >= pair[1].delta));

        let all = SalaryHistoryQuery::new()
            .by_year(2024)
            .top_increases(&dataset, 10)
            .unwrap();
        assert_eq!(all.len(), 4, "decreases are not increases");
    }

    #[test]
    fn top_increases_rejects_zero_limit() {
        let dataset = scenario();
        let err = SalaryHistoryQuery::new()
            .top_increases(&dataset, 0)
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidLimit(0));
    }

    #[test]
    fn top_increases_skips_single_entry_periods() {
        let dataset = scenario();
        let top = SalaryHistoryQuery::new()
            .by_year(2023)
            .top_increases(&dataset, 3)
            .unwrap();
        assert!(top.is_empty());
    }

    #[test]
    fn monthly_stats_are_dense_and_ordered() {
        let dataset = scenario();
        let stats = SalaryHistoryQuery::new()
            .monthly_stats(&dataset, 2024)
            .unwrap();

        assert_eq!(stats.len(), 12);
        assert!(stats
            .iter()
            .enumerate()
            .all(|(slot, bucket)| bucket.month == slot as u32 + 1));
        assert_eq!(stats[0].count, 1);
        assert_eq!(stats[0].total_delta, 5_000);
        assert_eq!(stats[0].average_delta, Some(5_000.0));
        assert!(stats[1..].iter().all(|bucket| bucket.count == 0
            && bucket.total_delta == 0
            && bucket.average_delta.is_none()));

        let empty = SalaryHistoryQuery::new()
            .monthly_stats(&dataset, 1990)
            .unwrap();
        assert_eq!(empty.len(), 12);
        assert!(empty.iter().all(|bucket| bucket.count == 0));
    }

    #[test]
    fn monthly_stats_count_first_entries_without_delta() {
        let dataset = scenario();
        let stats = SalaryHistoryQuery::new()
            .monthly_stats(&dataset, 2023)
            .unwrap();
        assert_eq!(stats[0].count, 1);
        assert_eq!(stats[0].total_delta, 0);
        assert_eq!(stats[0].average_delta, None);
    }

    #[test]
    fn monthly_stats_reject_unknown_year() {
        let dataset = scenario();
        let err = SalaryHistoryQuery::new()
            .monthly_stats(&dataset, 20_000)
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidYear(20_000));
    }

    #[test]
    fn avg_growth_groups_by_role_at_entry_time() {
        let dataset = Dataset::from(Records {
            roles: vec![
                role(1, "Developer", 1, Seniority::Junior),
                role(2, "Senior Developer", 1, Seniority::Senior),
            ],
            employees: vec![employee(1, 2, date(2020, 1, 1)), employee(2, 1, date(2020, 1, 1))],
            salary_history: vec![
                salary(1, 1, 40_000, date(2020, 1, 1)),
                salary(2, 1, 44_000, date(2021, 1, 1)),
                salary(3, 1, 60_000, date(2022, 6, 1)),
                salary(4, 1, 66_000, date(2023, 6, 1)),
                salary(5, 2, 50_000, date(2020, 1, 1)),
                salary(6, 2, 50_000, date(2021, 1, 1)),
            ],
            role_history: vec![RoleHistory::new(
                1,
                1,
                (1, Seniority::Junior),
                (2, Seniority::Senior),
                date(2022, 6, 1),
            )],
            ..Records::default()
        });

        let growth = SalaryHistoryQuery::new()
            .avg_growth_by_role(&dataset)
            .unwrap();

        assert_eq!(growth.len(), 2);
        assert_eq!(growth[0].role_title, "Senior Developer");
        assert_eq!(growth[0].members, 1);
        assert!((growth[0].average_growth_percentage - 10.0).abs() < 1e-9);
        assert_eq!(growth[1].role_title, "Developer");
        assert_eq!(growth[1].members, 2);
        assert_eq!(growth[1].total_changes, 4);
        assert!((growth[1].average_growth_percentage - 5.0).abs() < 1e-9);
    }

    #[test]
    fn avg_growth_excludes_zero_base_members() {
        let dataset = Dataset::from(Records {
            roles: vec![role(1, "Intern", 1, Seniority::Junior)],
            employees: vec![employee(1, 1, date(2020, 1, 1))],
            salary_history: vec![
                salary(1, 1, 0, date(2020, 1, 1)),
                salary(2, 1, 30_000, date(2021, 1, 1)),
            ],
            ..Records::default()
        });

        let growth = SalaryHistoryQuery::new()
            .avg_growth_by_role(&dataset)
            .unwrap();
        assert!(growth.is_empty());
    }

    #[test]
    fn role_monthly_stats_count_promotions() {
        let dataset = Dataset::from(Records {
            role_history: vec![
                RoleHistory::new(1, 1, (1, Seniority::Junior), (2, Seniority::Mid), date(2024, 3, 4)),
                RoleHistory::new(2, 2, (1, Seniority::Junior), (3, Seniority::Junior), date(2024, 3, 9)),
                RoleHistory::new(3, 3, (2, Seniority::Mid), (4, Seniority::Senior), date(2024, 11, 1)),
                RoleHistory::new(4, 3, (4, Seniority::Senior), (2, Seniority::Mid), date(2025, 1, 1)),
            ],
            ..Records::default()
        });

        let stats = RoleHistoryQuery::new().monthly_stats(&dataset, 2024).unwrap();
        assert_eq!(stats.len(), 12);
        assert_eq!(stats[2].total_changes, 2);
        assert_eq!(stats[2].promotions, 1);
        assert_eq!(stats[10].promotions, 1);
        assert_eq!(stats.iter().map(|bucket| bucket.total_changes).sum::<u64>(), 3);
    }

    #[test]
    fn salary_change_guards_zero_base() {
        let dataset = Dataset::from(Records {
            salary_history: vec![
                salary(1, 1, 0, date(2020, 1, 1)),
                salary(2, 1, 30_000, date(2021, 1, 1)),
            ],
            ..Records::default()
        });
        let changes = SalaryHistoryQuery::new().changes(&dataset).unwrap();
        assert_eq!(changes[1].change_amount, Some(30_000));
        assert_eq!(changes[1].change_percentage, None);
        assert!(changes[1].is_raise());
        assert!(!changes[0].is_raise());
    }
}
