//! Write-side rules checked before history rows are appended.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::types::{Employee, RoleChangeKind, Seniority};

/// Checks a salary change against the employee's current state.
///
/// `latest_change` is the effective date of the newest salary entry; a
/// change may not be dated before it, so the current salary always
/// matches the end of the history.
pub fn validate_salary_change(
    employee: &Employee,
    amount: i64,
    effective_date: NaiveDate,
    latest_change: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::NonPositiveSalary(amount));
    }
    if amount == employee.current_salary {
        return Err(ValidationError::UnchangedSalary(amount));
    }
    not_before_hire(employee, effective_date)?;
    not_before_latest(effective_date, latest_change)
}

/// Checks a role change and returns its classification.
///
/// `latest_change` is the effective date of the newest role history row.
pub fn validate_role_change(
    employee: &Employee,
    new_role_id: i64,
    new_seniority: Seniority,
    effective_date: NaiveDate,
    latest_change: Option<NaiveDate>,
) -> Result<RoleChangeKind, ValidationError> {
    if new_role_id == employee.role_id && new_seniority == employee.seniority {
        return Err(ValidationError::NoRoleChange);
    }
    not_before_hire(employee, effective_date)?;
    not_before_latest(effective_date, latest_change)?;
    Ok(RoleChangeKind::classify(employee.seniority, new_seniority))
}

/// Rejects assignments that would make the manager chain loop.
///
/// `manager_of` returns the current manager of an employee id.
pub fn validate_manager_assignment(
    employee_id: i64,
    manager_id: i64,
    manager_of: impl Fn(i64) -> Option<i64>,
) -> Result<(), ValidationError> {
    if employee_id == manager_id {
        return Err(ValidationError::SelfManagement(employee_id));
    }

    let mut visited = HashSet::new();
    let mut cursor = Some(manager_id);
    while let Some(current) = cursor {
        if current == employee_id {
            return Err(ValidationError::ManagerCycle {
                employee_id,
                manager_id,
            });
        }
        // existing loops upstream are not ours to report
        if !visited.insert(current) {
            break;
        }
        cursor = manager_of(current);
    }
    Ok(())
}

pub fn validate_termination(
    employee: &Employee,
    termination_date: NaiveDate,
) -> Result<(), ValidationError> {
    if employee.termination_date.is_some() {
        return Err(ValidationError::AlreadyTerminated(employee.id));
    }
    if termination_date < employee.hire_date {
        return Err(ValidationError::TerminationBeforeHire {
            terminated: termination_date,
            hired: employee.hire_date,
        });
    }
    Ok(())
}

fn not_before_hire(employee: &Employee, effective_date: NaiveDate) -> Result<(), ValidationError> {
    if effective_date < employee.hire_date {
        return Err(ValidationError::BeforeHireDate {
            effective: effective_date,
            hired: employee.hire_date,
        });
    }
    Ok(())
}

fn not_before_latest(
    effective_date: NaiveDate,
    latest_change: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match latest_change {
        Some(latest) if effective_date < latest => Err(ValidationError::BeforeLatestChange {
            effective: effective_date,
            latest,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::fixtures::*;

    #[test]
    fn salary_changes_must_be_positive_new_and_after_hire() {
        let subject = employee(1, 1, date(2022, 1, 1));
        assert_eq!(
            validate_salary_change(&subject, 0, date(2023, 1, 1), None),
            Err(ValidationError::NonPositiveSalary(0))
        );
        assert_eq!(
            validate_salary_change(&subject, 50_000, date(2023, 1, 1), None),
            Err(ValidationError::UnchangedSalary(50_000))
        );
        assert_eq!(
            validate_salary_change(&subject, 55_000, date(2021, 12, 31), None),
            Err(ValidationError::BeforeHireDate {
                effective: date(2021, 12, 31),
                hired: date(2022, 1, 1)
            })
        );
        assert!(validate_salary_change(&subject, 45_000, date(2022, 1, 1), None).is_ok());
    }

    #[test]
    fn changes_cannot_predate_the_latest_history_entry() {
        let subject = employee(1, 1, date(2022, 1, 1));
        let latest = Some(date(2025, 1, 1));
        assert_eq!(
            validate_salary_change(&subject, 55_000, date(2024, 1, 1), latest),
            Err(ValidationError::BeforeLatestChange {
                effective: date(2024, 1, 1),
                latest: date(2025, 1, 1)
            })
        );
        assert!(validate_salary_change(&subject, 55_000, date(2025, 1, 1), latest).is_ok());
        assert_eq!(
            validate_role_change(&subject, 2, Seniority::Mid, date(2024, 6, 1), latest),
            Err(ValidationError::BeforeLatestChange {
                effective: date(2024, 6, 1),
                latest: date(2025, 1, 1)
            })
        );
        assert_eq!(
            validate_role_change(&subject, 2, Seniority::Mid, date(2025, 3, 1), latest),
            Ok(RoleChangeKind::Promotion)
        );
    }

    #[test]
    fn role_changes_are_classified() {
        let subject = employee(1, 1, date(2022, 1, 1));
        assert_eq!(
            validate_role_change(&subject, 1, Seniority::Junior, date(2023, 1, 1), None),
            Err(ValidationError::NoRoleChange)
        );
        assert_eq!(
            validate_role_change(&subject, 1, Seniority::Mid, date(2023, 1, 1), None),
            Ok(RoleChangeKind::Promotion)
        );
        assert_eq!(
            validate_role_change(&subject, 2, Seniority::Junior, date(2023, 1, 1), None),
            Ok(RoleChangeKind::LateralMove)
        );
    }

    #[test]
    fn manager_assignment_rejects_cycles() {
        // 3 reports to 2, 2 reports to 1
        let chain: HashMap<i64, i64> = HashMap::from([(3, 2), (2, 1)]);
        let manager_of = |id: i64| chain.get(&id).copied();

        assert_eq!(
            validate_manager_assignment(4, 4, manager_of),
            Err(ValidationError::SelfManagement(4))
        );
        assert_eq!(
            validate_manager_assignment(1, 3, manager_of),
            Err(ValidationError::ManagerCycle {
                employee_id: 1,
                manager_id: 3
            })
        );
        assert!(validate_manager_assignment(4, 3, manager_of).is_ok());
    }

    #[test]
    fn termination_after_hire_only_once() {
        let mut subject = employee(1, 1, date(2022, 1, 1));
        assert!(validate_termination(&subject, date(2022, 1, 1)).is_ok());
        assert!(matches!(
            validate_termination(&subject, date(2021, 1, 1)),
            Err(ValidationError::TerminationBeforeHire { .. })
        ));
        subject.termination_date = Some(date(2024, 1, 1));
        assert_eq!(
            validate_termination(&subject, date(2024, 2, 1)),
            Err(ValidationError::AlreadyTerminated(1))
        );
    }
}
