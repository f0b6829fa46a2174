use serde::Serialize;
use tracing::info;

use hr_insights_core::dashboard::{active_employee, resolve_dashboard, DashboardKind};
use hr_insights_core::stats::{
    employee_context, CompanyOverview, DepartmentStats, EmployeeContext, GroupCount, RecentHires,
    SystemOverview, UserSummary,
};
use hr_insights_core::AccessError;

use crate::services::{ServiceError, StatsServices};

/// Dashboard body, tagged with the resolved kind.
#[derive(Debug, Serialize)]
#[serde(tag = "dashboard", rename_all = "snake_case")]
pub enum DashboardPayload {
    Admin {
        system: SystemOverview,
        users_without_profile: Vec<UserSummary>,
        group_distribution: Vec<GroupCount>,
        recent_users: Vec<UserSummary>,
    },
    Hr {
        company: CompanyOverview,
        departments: Vec<DepartmentStats>,
        recent_hires: RecentHires,
    },
    TeamLead {
        context: EmployeeContext,
    },
    Employee {
        context: EmployeeContext,
    },
}

/// Resolves the user's dashboard and assembles its payload.
///
/// Resolution always reads a fresh snapshot; the aggregate sections come
/// from the cached services.
pub async fn build_dashboard(
    services: &StatsServices,
    user_id: i64,
) -> Result<DashboardPayload, ServiceError> {
    let as_of = services.today();
    let dataset = services.snapshot().await?;
    let kind = resolve_dashboard(&dataset, user_id, as_of)?;
    info!(stage = "app", user_id, dashboard = kind.as_str(), "dashboard resolved");

    let payload = match kind {
        DashboardKind::Admin => DashboardPayload::Admin {
            system: services.system_overview().await?,
            users_without_profile: services.users_without_profile().await?,
            group_distribution: services.group_distribution().await?,
            recent_users: services.dashboard_recent_users().await?,
        },
        DashboardKind::Hr => DashboardPayload::Hr {
            company: services.company_overview().await?,
            departments: services.department_overview().await?,
            recent_hires: services
                .recent_hires(services.recent_activity_days())
                .await?,
        },
        DashboardKind::TeamLead | DashboardKind::Employee => {
            let user = dataset
                .user(user_id)
                .ok_or(AccessError::UnknownUser(user_id))?;
            let employee = active_employee(&dataset, user, as_of)?;
            let context = employee_context(&dataset, employee.id, as_of)
                .ok_or_else(|| AccessError::EmployeeNotFound(user.username.clone()))?;
            if kind == DashboardKind::TeamLead {
                DashboardPayload::TeamLead { context }
            } else {
                DashboardPayload::Employee { context }
            }
        }
    };
    Ok(payload)
}
