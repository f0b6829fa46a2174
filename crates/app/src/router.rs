use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Datelike, NaiveDate};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use hr_insights_core::stats::DEFAULT_RECENT_ITEMS_LIMIT;
use hr_insights_core::ValidationError;

use crate::dashboard::build_dashboard;
use crate::problem::ProblemResponse;
use crate::services::{ServiceError, StatsServices};
use crate::telemetry;

const DEFAULT_STALE_MONTHS: i64 = 12;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    services: StatsServices,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, services: StatsServices) -> Self {
        Self { metrics, services }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn services(&self) -> &StatsServices {
        &self.services
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/stats/company", get(company_stats))
        .route("/api/stats/departments", get(department_stats))
        .route("/api/stats/recent-hires", get(recent_hires))
        .route(
            "/api/analytics/salary/top-increases",
            get(salary_top_increases),
        )
        .route("/api/analytics/salary/monthly", get(salary_monthly))
        .route("/api/analytics/salary/growth-by-role", get(salary_growth))
        .route("/api/analytics/roles/monthly", get(role_monthly))
        .route("/api/analytics/roles/promotions", get(role_promotions))
        .route("/api/analytics/employees/stale", get(stale_employees))
        .route("/dashboards/:user_id", get(dashboard))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

type ApiResult<T> = Result<Json<T>, ProblemResponse>;

/// Records the request outcome and maps service errors to problem responses.
fn respond<T: Serialize>(route: &'static str, result: Result<T, ServiceError>) -> ApiResult<T> {
    match result {
        Ok(value) => {
            counter!("api_requests_total", "route" => route, "result" => "ok").increment(1);
            Ok(Json(value))
        }
        Err(err) => {
            let problem = ProblemResponse::from(err);
            let result = if problem.status().is_server_error() {
                "error"
            } else {
                "rejected"
            };
            counter!("api_requests_total", "route" => route, "result" => result).increment(1);
            Err(problem)
        }
    }
}

fn query_params<T>(
    route: &'static str,
    query: Result<Query<T>, QueryRejection>,
) -> Result<T, ProblemResponse> {
    query.map(|Query(params)| params).map_err(|rejection| {
        counter!("api_requests_total", "route" => route, "result" => "rejected").increment(1);
        ProblemResponse::new(
            StatusCode::BAD_REQUEST,
            "invalid_query",
            rejection.body_text(),
        )
    })
}

fn positive_u32(
    value: i64,
    invalid: fn(i64) -> ValidationError,
) -> Result<u32, ValidationError> {
    u32::try_from(value)
        .ok()
        .filter(|value| *value > 0)
        .ok_or(invalid(value))
}

async fn company_stats(State(state): State<AppState>) -> ApiResult<impl Serialize> {
    respond("company", state.services().company_overview().await)
}

async fn department_stats(State(state): State<AppState>) -> ApiResult<impl Serialize> {
    respond("departments", state.services().department_overview().await)
}

#[derive(Debug, Deserialize)]
struct RecentHiresQuery {
    #[serde(default)]
    days: Option<i64>,
}

async fn recent_hires(
    State(state): State<AppState>,
    query: Result<Query<RecentHiresQuery>, QueryRejection>,
) -> ApiResult<impl Serialize> {
    const ROUTE: &str = "recent_hires";
    let params = query_params(ROUTE, query)?;
    let services = state.services();
    let result = match params.days {
        Some(days) => positive_u32(days, ValidationError::InvalidActivityDays)
            .map_err(ServiceError::from),
        None => Ok(services.recent_activity_days()),
    };
    let result = match result {
        Ok(days) => services.recent_hires(days).await,
        Err(err) => Err(err),
    };
    respond(ROUTE, result)
}

#[derive(Debug, Deserialize)]
struct TopIncreasesQuery {
    #[serde(default)]
    start: Option<NaiveDate>,
    #[serde(default)]
    end: Option<NaiveDate>,
    #[serde(default)]
    n: Option<i64>,
}

async fn salary_top_increases(
    State(state): State<AppState>,
    query: Result<Query<TopIncreasesQuery>, QueryRejection>,
) -> ApiResult<impl Serialize> {
    const ROUTE: &str = "salary_top_increases";
    let params = query_params(ROUTE, query)?;
    let n = params.n.unwrap_or(DEFAULT_RECENT_ITEMS_LIMIT as i64);
    let result = match usize::try_from(n).ok().filter(|n| *n > 0) {
        Some(limit) => {
            state
                .services()
                .top_increases(params.start, params.end, limit)
                .await
        }
        None => Err(ValidationError::InvalidLimit(n).into()),
    };
    respond(ROUTE, result)
}

#[derive(Debug, Deserialize)]
struct YearQuery {
    #[serde(default)]
    year: Option<i32>,
}

async fn salary_monthly(
    State(state): State<AppState>,
    query: Result<Query<YearQuery>, QueryRejection>,
) -> ApiResult<impl Serialize> {
    const ROUTE: &str = "salary_monthly";
    let params = query_params(ROUTE, query)?;
    let services = state.services();
    let year = params.year.unwrap_or_else(|| services.today().year());
    respond(ROUTE, services.salary_monthly_stats(year).await)
}

async fn salary_growth(State(state): State<AppState>) -> ApiResult<impl Serialize> {
    respond("salary_growth", state.services().growth_by_role().await)
}

async fn role_monthly(
    State(state): State<AppState>,
    query: Result<Query<YearQuery>, QueryRejection>,
) -> ApiResult<impl Serialize> {
    const ROUTE: &str = "role_monthly";
    let params = query_params(ROUTE, query)?;
    let services = state.services();
    let year = params.year.unwrap_or_else(|| services.today().year());
    respond(ROUTE, services.role_monthly_stats(year).await)
}

async fn role_promotions(
    State(state): State<AppState>,
    query: Result<Query<YearQuery>, QueryRejection>,
) -> ApiResult<impl Serialize> {
    const ROUTE: &str = "role_promotions";
    let params = query_params(ROUTE, query)?;
    respond(ROUTE, state.services().promotions(params.year).await)
}

#[derive(Debug, Deserialize)]
struct StaleQuery {
    #[serde(default)]
    months: Option<i64>,
}

async fn stale_employees(
    State(state): State<AppState>,
    query: Result<Query<StaleQuery>, QueryRejection>,
) -> ApiResult<impl Serialize> {
    const ROUTE: &str = "stale_employees";
    let params = query_params(ROUTE, query)?;
    let months = params.months.unwrap_or(DEFAULT_STALE_MONTHS);
    let result = match positive_u32(months, ValidationError::InvalidLookbackMonths) {
        Ok(months) => state.services().stale_employees(months).await,
        Err(err) => Err(err.into()),
    };
    respond(ROUTE, result)
}

async fn dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<impl Serialize> {
    respond("dashboard", build_dashboard(state.services(), user_id).await)
}
